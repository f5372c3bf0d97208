//! Verb to handler mapping
//!
//! Adding a command means registering one more [`CommandHandler`] here.

use std::collections::HashMap;
use std::sync::Arc;

use crate::protocol::handlers::*;

/// Lookup table from upper-cased verb to its handler.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<&'static str, Arc<dyn CommandHandler>>,
}

impl HandlerRegistry {
    /// Registry with every verb the server implements.
    pub fn standard() -> Self {
        let mut registry = Self::default();
        registry.register("USER", UserHandler);
        registry.register("PASS", PassHandler);
        registry.register("SYST", SystHandler);
        registry.register("FEAT", FeatHandler);
        registry.register("QUIT", QuitHandler);
        registry.register("NOOP", NoopHandler);
        registry.register("TYPE", TypeHandler);
        registry.register("PASV", PasvHandler);
        registry.register("CWD", CwdHandler);
        registry.register("CDUP", CdupHandler);
        registry.register("PWD", PwdHandler);
        registry.register("SIZE", SizeHandler);
        registry.register("LIST", ListHandler);
        registry.register("RETR", RetrHandler);
        registry.register("STOR", StorHandler);
        registry
    }

    pub fn register(&mut self, verb: &'static str, handler: impl CommandHandler + 'static) {
        self.handlers.insert(verb, Arc::new(handler));
    }

    pub fn get(&self, verb: &str) -> Option<Arc<dyn CommandHandler>> {
        self.handlers.get(verb).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_login_verbs_skip_auth() {
        let registry = HandlerRegistry::standard();
        let open: Vec<&str> = ["USER", "PASS", "SYST", "FEAT", "QUIT"]
            .into_iter()
            .filter(|verb| !registry.get(verb).unwrap().requires_auth())
            .collect();
        assert_eq!(open.len(), 5);

        for verb in ["NOOP", "TYPE", "PASV", "CWD", "CDUP", "PWD", "SIZE", "LIST", "RETR", "STOR"] {
            assert!(registry.get(verb).unwrap().requires_auth(), "{verb}");
        }
    }

    #[test]
    fn unknown_verbs_are_absent() {
        let registry = HandlerRegistry::standard();
        for verb in ["PORT", "EPSV", "MKD", "DELE", "APPE"] {
            assert!(registry.get(verb).is_none(), "{verb}");
        }
        assert!(registry.get("user").is_none());
    }
}
