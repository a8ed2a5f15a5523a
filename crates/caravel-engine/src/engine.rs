//! The one-shot engine facade.
//!
//! An [`Engine`] owns the validated maps, the client registry, and the
//! per-cycle caches. Each high-level action resolves its selectors, picks
//! the state and action generators from the intent table, and hands the
//! emitted operations to the runner.

use caravel_client::{ClientConfiguration, ClientRegistry, DockerApi};
use caravel_map::ContainerMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::action::script::ScriptActionGenerator;
use crate::action::simple::{
    CreateActionGenerator, PullActionGenerator, RemoveActionGenerator, RestartActionGenerator,
    ShutdownActionGenerator, SignalActionGenerator, StartActionGenerator,
    StartupActionGenerator, StopActionGenerator,
};
use crate::action::update::UpdateActionGenerator;
use crate::action::{ActionContext, ActionGenerator, ItemAction, ScriptSpec};
use crate::cache::NameCache;
use crate::error::{ActionOutput, EngineResult};
use crate::options::ActionOptions;
use crate::policy::Policy;
use crate::runner::Runner;
use crate::state::base::StateGenerator;
use crate::state::StateKind;

/// High-level actions of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Create,
    Start,
    Restart,
    Stop,
    Remove,
    Startup,
    Shutdown,
    Update,
    Signal,
    Pull,
}

/// The state generator variant and action generator used per intent.
fn strategy(intent: Intent) -> (StateKind, Box<dyn ActionGenerator>) {
    match intent {
        Intent::Create => (StateKind::Forward, Box::new(CreateActionGenerator)),
        Intent::Start => (StateKind::Forward, Box::new(StartActionGenerator)),
        Intent::Restart => (StateKind::Single, Box::new(RestartActionGenerator)),
        Intent::Stop => (StateKind::Reverse, Box::new(StopActionGenerator)),
        Intent::Remove => (StateKind::Reverse, Box::new(RemoveActionGenerator)),
        Intent::Startup => (StateKind::Forward, Box::new(StartupActionGenerator::default())),
        Intent::Shutdown => (StateKind::Reverse, Box::new(ShutdownActionGenerator)),
        Intent::Update => (StateKind::Update, Box::new(UpdateActionGenerator)),
        Intent::Signal => (StateKind::Single, Box::new(SignalActionGenerator)),
        Intent::Pull => (StateKind::Forward, Box::new(PullActionGenerator)),
    }
}

#[derive(Default)]
pub struct EngineBuilder {
    maps: Vec<ContainerMap>,
    registry: ClientRegistry,
}

impl EngineBuilder {
    /// Adds a container map. The first map added is the default for
    /// selectors without a map prefix.
    pub fn map(mut self, map: ContainerMap) -> Self {
        self.maps.push(map);
        self
    }

    pub fn client(
        mut self,
        name: impl Into<String>,
        config: ClientConfiguration,
        api: Arc<dyn DockerApi>,
    ) -> Self {
        self.registry.insert(name, config, api);
        self
    }

    /// Checks map integrity, probes client capabilities, and builds the
    /// engine. No other daemon calls are made here.
    pub async fn build(mut self) -> EngineResult<Engine> {
        for map in &self.maps {
            map.check_integrity()?;
        }
        self.registry.probe_features().await?;
        let policy = Policy::new(self.maps, self.registry)?;
        info!("engine ready");
        Ok(Engine {
            policy,
            cache: NameCache::new(),
        })
    }
}

pub struct Engine {
    policy: Policy,
    cache: NameCache,
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Drops the name and image caches; the next cycle reloads them from
    /// the daemons.
    pub fn refresh_names(&self) {
        self.cache.refresh();
    }

    /// Emits the ordered operation list for an intent without executing it.
    /// Only inspect calls are made.
    pub async fn plan(
        &self,
        intent: Intent,
        selectors: &[&str],
        options: &ActionOptions,
    ) -> EngineResult<Vec<ItemAction>> {
        let (kind, generator) = strategy(intent);
        self.plan_with(kind, generator.as_ref(), selectors, options)
            .await
    }

    async fn plan_with(
        &self,
        kind: StateKind,
        generator: &dyn ActionGenerator,
        selectors: &[&str],
        options: &ActionOptions,
    ) -> EngineResult<Vec<ItemAction>> {
        let inputs = self.policy.resolve_selectors(selectors)?;
        debug!(?kind, inputs = inputs.len(), "planning");
        let state_generator = StateGenerator {
            policy: &self.policy,
            cache: &self.cache,
            options,
            kind,
        };
        let states = state_generator.states(&inputs).await?;
        let context = ActionContext {
            policy: &self.policy,
            options,
        };
        let mut actions = Vec::new();
        for state in &states {
            actions.extend(generator.actions_for(state, &context)?);
        }
        Ok(actions)
    }

    /// Plans and executes an intent.
    pub async fn run(
        &self,
        intent: Intent,
        selectors: &[&str],
        options: &ActionOptions,
    ) -> EngineResult<Vec<ActionOutput>> {
        let actions = self.plan(intent, selectors, options).await?;
        self.run_with_options(actions, options).await
    }

    async fn run_with_options(
        &self,
        actions: Vec<ItemAction>,
        options: &ActionOptions,
    ) -> EngineResult<Vec<ActionOutput>> {
        let runner = Runner {
            policy: &self.policy,
            cache: &self.cache,
            options,
        };
        runner.run(actions).await
    }

    pub async fn create(
        &self,
        selectors: &[&str],
        options: &ActionOptions,
    ) -> EngineResult<Vec<ActionOutput>> {
        let actions = self.plan(Intent::Create, selectors, options).await?;
        self.run_with_options(actions, options).await
    }

    pub async fn start(
        &self,
        selectors: &[&str],
        options: &ActionOptions,
    ) -> EngineResult<Vec<ActionOutput>> {
        let actions = self.plan(Intent::Start, selectors, options).await?;
        self.run_with_options(actions, options).await
    }

    pub async fn restart(
        &self,
        selectors: &[&str],
        options: &ActionOptions,
    ) -> EngineResult<Vec<ActionOutput>> {
        let actions = self.plan(Intent::Restart, selectors, options).await?;
        self.run_with_options(actions, options).await
    }

    pub async fn stop(
        &self,
        selectors: &[&str],
        options: &ActionOptions,
    ) -> EngineResult<Vec<ActionOutput>> {
        let actions = self.plan(Intent::Stop, selectors, options).await?;
        self.run_with_options(actions, options).await
    }

    pub async fn remove(
        &self,
        selectors: &[&str],
        options: &ActionOptions,
    ) -> EngineResult<Vec<ActionOutput>> {
        let actions = self.plan(Intent::Remove, selectors, options).await?;
        self.run_with_options(actions, options).await
    }

    pub async fn startup(
        &self,
        selectors: &[&str],
        options: &ActionOptions,
    ) -> EngineResult<Vec<ActionOutput>> {
        let actions = self.plan(Intent::Startup, selectors, options).await?;
        self.run_with_options(actions, options).await
    }

    pub async fn shutdown(
        &self,
        selectors: &[&str],
        options: &ActionOptions,
    ) -> EngineResult<Vec<ActionOutput>> {
        let actions = self.plan(Intent::Shutdown, selectors, options).await?;
        self.run_with_options(actions, options).await
    }

    pub async fn update(
        &self,
        selectors: &[&str],
        options: &ActionOptions,
    ) -> EngineResult<Vec<ActionOutput>> {
        let actions = self.plan(Intent::Update, selectors, options).await?;
        self.run_with_options(actions, options).await
    }

    pub async fn signal(
        &self,
        selectors: &[&str],
        options: &ActionOptions,
    ) -> EngineResult<Vec<ActionOutput>> {
        let actions = self.plan(Intent::Signal, selectors, options).await?;
        self.run_with_options(actions, options).await
    }

    pub async fn pull(
        &self,
        selectors: &[&str],
        options: &ActionOptions,
    ) -> EngineResult<Vec<ActionOutput>> {
        let actions = self.plan(Intent::Pull, selectors, options).await?;
        self.run_with_options(actions, options).await
    }

    /// Runs a script in a one-shot container created from the selected
    /// configuration, bringing its dependencies up first.
    pub async fn run_script(
        &self,
        selector: &str,
        spec: ScriptSpec,
        options: &ActionOptions,
    ) -> EngineResult<Vec<ActionOutput>> {
        let generator = ScriptActionGenerator::new(spec);
        let actions = self
            .plan_with(StateKind::Forward, &generator, &[selector], options)
            .await?;
        self.run_with_options(actions, options).await
    }
}
