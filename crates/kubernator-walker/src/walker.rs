//! The directory walker: a LIFO stack of `(context frame, path)` pairs,
//! driving the plugin lifecycle hooks at each step (`SPEC_FULL.md` §4.5).

use std::path::{Path, PathBuf};
use std::rc::Rc;

use kubernator_core::{Context, Globs};
use serde_json::Value as JsonValue;

use crate::error::Result;
use crate::plugin::{Plugin, PluginRegistry};
use crate::script;

const DIR_EXCLUDES_KEY: &str = "dir_excludes";
const DIR_INCLUDES_KEY: &str = "dir_includes";

/// Where the walk currently is in a directory's lifecycle, tracked so a
/// plugin registered mid-walk knows which hooks it missed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    BeforeDir,
    BeforeScript,
    AfterScript,
    AfterDir,
    Terminal,
}

struct ActivePlugin {
    name: String,
    plugin: Box<dyn Plugin>,
}

/// Drives one full walk: directory traversal, plugin hooks, and the four
/// terminal phases that run once traversal completes.
pub struct Walker {
    registry: PluginRegistry,
    active: Vec<ActivePlugin>,
    /// Directories from the walk root down to the one currently being
    /// visited — used to replay `before_dir` for a plugin registered
    /// mid-walk.
    open_dirs: Vec<PathBuf>,
    phase: Phase,
}

impl Walker {
    pub fn new(registry: PluginRegistry) -> Self {
        Self {
            registry,
            active: Vec::new(),
            open_dirs: Vec::new(),
            phase: Phase::BeforeDir,
        }
    }

    /// Register a plugin, declaratively (from a script) or imperatively (from
    /// a running plugin). Idempotent: re-registering an already-active name
    /// is a no-op. Synthetically fires every hook the plugin would already
    /// have seen had it been registered at the start of the walk: `init`,
    /// `start`, `before_dir` for every directory currently open on the stack,
    /// and `before_script` for the current directory if its script is still
    /// executing.
    pub async fn register_plugin(
        &mut self,
        name: &str,
        config: JsonValue,
        ctx: &Rc<Context>,
    ) -> Result<()> {
        if self.active.iter().any(|p| p.name == name) {
            return Ok(());
        }
        let mut plugin = self.registry.create(name, config)?;
        plugin.init(ctx).await?;
        plugin.start(ctx).await?;
        for dir in &self.open_dirs {
            plugin.before_dir(ctx, dir).await?;
        }
        if matches!(
            self.phase,
            Phase::BeforeScript | Phase::AfterScript | Phase::AfterDir
        ) {
            if let Some(leaf) = self.open_dirs.last() {
                plugin.before_script(ctx, leaf).await?;
            }
        }
        self.active.push(ActivePlugin {
            name: name.to_string(),
            plugin,
        });
        Ok(())
    }

    fn list_subdirs(dir: &Path, ctx: &Rc<Context>) -> Result<Vec<PathBuf>> {
        let excludes = Globs::from_patterns(
            ctx.get_list(DIR_EXCLUDES_KEY)
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string)),
        )?;
        let includes_patterns: Vec<String> = ctx
            .get_list(DIR_INCLUDES_KEY)
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect();
        let includes = if includes_patterns.is_empty() {
            None
        } else {
            Some(Globs::from_patterns(includes_patterns)?)
        };

        let mut subdirs = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if excludes.matches(&name) {
                continue;
            }
            if let Some(includes) = &includes {
                if !includes.matches(&name) {
                    continue;
                }
            }
            subdirs.push(entry.path());
        }
        subdirs.sort();
        Ok(subdirs)
    }

    async fn run_script(&mut self, ctx: &Rc<Context>, dir: &Path) -> Result<()> {
        self.phase = Phase::BeforeScript;
        for active in self.active.iter_mut() {
            active.plugin.before_script(ctx, dir).await?;
        }

        if let Some(parsed) = script::load(dir)? {
            script::apply_globals(ctx, &parsed.globals);
            for registration in parsed.plugins {
                self.register_plugin(&registration.name, registration.config, ctx)
                    .await?;
            }
        }

        self.phase = Phase::AfterScript;
        for active in self.active.iter_mut().rev() {
            active.plugin.after_script(ctx, dir).await?;
        }
        Ok(())
    }

    /// Run the full walk rooted at `root`, then the terminal `apply` →
    /// `verify` → `summary` → `shutdown` phases over every active plugin in
    /// reverse registration order.
    pub async fn run(&mut self, root: &Path, root_ctx: Rc<Context>) -> Result<()> {
        let mut stack: Vec<(Rc<Context>, PathBuf)> = vec![(root_ctx.clone(), root.to_path_buf())];

        while let Some((ctx, dir)) = stack.pop() {
            self.open_dirs.push(dir.clone());

            self.phase = Phase::BeforeDir;
            for active in self.active.iter_mut() {
                active.plugin.before_dir(&ctx, &dir).await?;
            }

            if dir.join(script::SCRIPT_FILE_NAME).is_file() {
                self.run_script(&ctx, &dir).await?;
            }

            self.phase = Phase::AfterDir;
            for active in self.active.iter_mut().rev() {
                active.plugin.after_dir(&ctx, &dir).await?;
            }

            let subdirs = Self::list_subdirs(&dir, &ctx)?;
            for sub in subdirs.into_iter().rev() {
                let child_ctx = Rc::new(ctx.child());
                stack.push((child_ctx, sub));
            }

            self.open_dirs.pop();
        }

        self.phase = Phase::Terminal;
        for active in self.active.iter_mut().rev() {
            active.plugin.apply(&root_ctx).await?;
        }
        for active in self.active.iter_mut().rev() {
            active.plugin.verify(&root_ctx).await?;
        }
        for active in self.active.iter_mut().rev() {
            active.plugin.summary(&root_ctx).await?;
        }
        for active in self.active.iter_mut().rev() {
            active.plugin.shutdown(&root_ctx).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::cell::RefCell;
    use std::rc::Rc as StdRc;

    #[derive(Default)]
    struct Events(StdRc<RefCell<Vec<String>>>);

    struct Recorder {
        name: &'static str,
        events: StdRc<RefCell<Vec<String>>>,
    }

    #[async_trait(?Send)]
    impl Plugin for Recorder {
        fn name(&self) -> &str {
            self.name
        }

        async fn before_dir(&mut self, _ctx: &Rc<Context>, dir: &Path) -> Result<()> {
            self.events
                .borrow_mut()
                .push(format!("before_dir:{}:{}", self.name, dir.file_name().unwrap().to_string_lossy()));
            Ok(())
        }

        async fn after_dir(&mut self, _ctx: &Rc<Context>, dir: &Path) -> Result<()> {
            self.events
                .borrow_mut()
                .push(format!("after_dir:{}:{}", self.name, dir.file_name().unwrap().to_string_lossy()));
            Ok(())
        }

        async fn apply(&mut self, _ctx: &Rc<Context>) -> Result<()> {
            self.events.borrow_mut().push(format!("apply:{}", self.name));
            Ok(())
        }
    }

    #[tokio::test]
    async fn visits_subdirectories_lexicographically() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("b")).unwrap();
        std::fs::create_dir(root.path().join("a")).unwrap();

        let events = Events::default();
        let mut registry = PluginRegistry::new();
        let ev = events.0.clone();
        registry.register("rec", move |_cfg| {
            Ok(Box::new(Recorder {
                name: "rec",
                events: ev.clone(),
            }) as Box<dyn Plugin>)
        });

        let mut walker = Walker::new(registry);
        walker
            .register_plugin("rec", JsonValue::Null, &Rc::new(Context::root()))
            .await
            .unwrap();
        walker.run(root.path(), Rc::new(Context::root())).await.unwrap();

        let log = events.0.borrow();
        let root_name = root.path().file_name().unwrap().to_string_lossy().to_string();
        let before_dirs: Vec<&String> = log.iter().filter(|e| e.starts_with("before_dir")).collect();
        assert_eq!(before_dirs[0], &format!("before_dir:rec:{root_name}"));
        assert!(before_dirs.iter().any(|e| e.ends_with(":a")));
        assert!(before_dirs.iter().any(|e| e.ends_with(":b")));
        let a_idx = before_dirs.iter().position(|e| e.ends_with(":a")).unwrap();
        let b_idx = before_dirs.iter().position(|e| e.ends_with(":b")).unwrap();
        assert!(a_idx < b_idx);
        assert!(log.iter().any(|e| e == "apply:rec"));
    }

    #[tokio::test]
    async fn dir_excludes_skip_matching_subdirectories() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("keep")).unwrap();
        std::fs::create_dir(root.path().join("vendor")).unwrap();

        let ctx = Rc::new(Context::root());
        ctx.extend_list(DIR_EXCLUDES_KEY, [JsonValue::String("vendor".to_string())]);

        let subdirs = Walker::list_subdirs(root.path(), &ctx).unwrap();
        let names: Vec<String> = subdirs
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert!(names.contains(&"keep".to_string()));
        assert!(!names.contains(&"vendor".to_string()));
    }
}
