//! The plugin lifecycle: a `Plugin` trait with hooks fired at well-defined
//! points of the directory walk, a compile-time registry of named factories,
//! and the bookkeeping that lets a plugin be registered mid-walk and still
//! observe a consistent state.

use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;

use async_trait::async_trait;
use kubernator_core::Context;
use serde_json::Value as JsonValue;

use crate::error::{Result, WalkError};

/// A plugin observes the directory walk through these hooks. Every hook has a
/// default no-op body; a plugin overrides only the ones it cares about.
///
/// `before_dir`/`before_script` fire in registration order; `after_script`/
/// `after_dir` and the four terminal phases fire in reverse registration
/// order (see `SPEC_FULL.md` §4.5 and §5).
#[async_trait(?Send)]
pub trait Plugin {
    fn name(&self) -> &str;

    async fn init(&mut self, _ctx: &Rc<Context>) -> Result<()> {
        Ok(())
    }
    async fn start(&mut self, _ctx: &Rc<Context>) -> Result<()> {
        Ok(())
    }
    async fn before_dir(&mut self, _ctx: &Rc<Context>, _dir: &Path) -> Result<()> {
        Ok(())
    }
    async fn before_script(&mut self, _ctx: &Rc<Context>, _dir: &Path) -> Result<()> {
        Ok(())
    }
    async fn after_script(&mut self, _ctx: &Rc<Context>, _dir: &Path) -> Result<()> {
        Ok(())
    }
    async fn after_dir(&mut self, _ctx: &Rc<Context>, _dir: &Path) -> Result<()> {
        Ok(())
    }
    async fn apply(&mut self, _ctx: &Rc<Context>) -> Result<()> {
        Ok(())
    }
    async fn verify(&mut self, _ctx: &Rc<Context>) -> Result<()> {
        Ok(())
    }
    async fn summary(&mut self, _ctx: &Rc<Context>) -> Result<()> {
        Ok(())
    }
    async fn shutdown(&mut self, _ctx: &Rc<Context>) -> Result<()> {
        Ok(())
    }
}

pub type PluginFactory = Box<dyn Fn(JsonValue) -> Result<Box<dyn Plugin>>>;

/// Maps a plugin name (as named in a `.kubernator.yaml`'s `register_plugin`
/// entries, or passed imperatively) to a factory that builds one, replacing
/// the original tool's package-module scanning with a registry built at
/// compile time: an embedding binary registers every plugin type it ships
/// with before the walk begins.
#[derive(Default)]
pub struct PluginRegistry {
    factories: HashMap<String, PluginFactory>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        factory: impl Fn(JsonValue) -> Result<Box<dyn Plugin>> + 'static,
    ) {
        self.factories.insert(name.into(), Box::new(factory));
    }

    pub fn create(&self, name: &str, config: JsonValue) -> Result<Box<dyn Plugin>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| WalkError::UnknownPlugin {
                name: name.to_string(),
            })?;
        factory(config)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop(String);

    #[async_trait(?Send)]
    impl Plugin for Noop {
        fn name(&self) -> &str {
            &self.0
        }
    }

    #[test]
    fn registry_creates_plugins_by_name() {
        let mut registry = PluginRegistry::new();
        registry.register("noop", |_cfg| Ok(Box::new(Noop("noop".into()))));
        let plugin = registry.create("noop", JsonValue::Null).unwrap();
        assert_eq!(plugin.name(), "noop");
    }

    #[test]
    fn unknown_plugin_is_an_error() {
        let registry = PluginRegistry::new();
        let err = registry.create("missing", JsonValue::Null).unwrap_err();
        assert!(matches!(err, WalkError::UnknownPlugin { .. }));
    }
}
