//! Step components and the providers that look them up by name.
//!
//! A component is a named factory for steps. Design assembly asks a
//! [`StepComponentProvider`] for each component a design references and lets
//! the component build the concrete step from the design's data.

use std::fmt;

use anyhow::Result;
use indexmap::IndexMap;
use scanflow_types::StepData;

use crate::step::{StepKey, StepSource};

/// Behaviour flags a component advertises. Design assembly falls back to
/// them for options a design leaves unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentOptions {
    /// Workflows built from this component start active.
    pub kick_start: bool,
    /// The component expects to run in a looping step tree.
    pub circular_processing: bool,
}

impl Default for ComponentOptions {
    fn default() -> Self {
        Self {
            kick_start: true,
            circular_processing: false,
        }
    }
}

pub trait StepComponent {
    /// Unique name designs refer to.
    fn component_name(&self) -> &str;

    fn label(&self) -> Option<&str> {
        None
    }

    fn description(&self) -> Option<&str> {
        None
    }

    fn options(&self) -> ComponentOptions {
        ComponentOptions::default()
    }

    /// Builds the step for one design entry. The returned step must report
    /// `key` when one is given.
    fn make_step(&self, data: Option<&StepData>, step_name: &str, key: Option<StepKey>) -> Result<StepSource>;
}

pub trait StepComponentProvider {
    fn step_component(&self, name: &str) -> Option<&dyn StepComponent>;
}

type MakeStepFn = Box<dyn Fn(Option<&StepData>, &str, Option<StepKey>) -> Result<StepSource>>;

/// Component backed by a closure.
pub struct FnStepComponent {
    name: String,
    label: Option<String>,
    description: Option<String>,
    options: ComponentOptions,
    make: MakeStepFn,
}

impl FnStepComponent {
    pub fn new<F>(name: impl Into<String>, make: F) -> Self
    where
        F: Fn(Option<&StepData>, &str, Option<StepKey>) -> Result<StepSource> + 'static,
    {
        Self {
            name: name.into(),
            label: None,
            description: None,
            options: ComponentOptions::default(),
            make: Box::new(make),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_options(mut self, options: ComponentOptions) -> Self {
        self.options = options;
        self
    }
}

impl fmt::Debug for FnStepComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnStepComponent")
            .field("name", &self.name)
            .field("label", &self.label)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl StepComponent for FnStepComponent {
    fn component_name(&self) -> &str {
        &self.name
    }

    fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    fn options(&self) -> ComponentOptions {
        self.options
    }

    fn make_step(&self, data: Option<&StepData>, step_name: &str, key: Option<StepKey>) -> Result<StepSource> {
        (self.make)(data, step_name, key)
    }
}

/// Fixed name → component table.
#[derive(Default)]
pub struct StaticComponentProvider {
    components: IndexMap<String, Box<dyn StepComponent>>,
}

impl StaticComponentProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a component, replacing any component with the same name.
    pub fn register(&mut self, component: impl StepComponent + 'static) {
        self.components.insert(component.component_name().to_string(), Box::new(component));
    }

    pub fn with(mut self, component: impl StepComponent + 'static) -> Self {
        self.register(component);
        self
    }

    pub fn component_names(&self) -> impl Iterator<Item = &str> {
        self.components.keys().map(String::as_str)
    }
}

impl fmt::Debug for StaticComponentProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticComponentProvider")
            .field("components", &self.components.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl StepComponentProvider for StaticComponentProvider {
    fn step_component(&self, name: &str) -> Option<&dyn StepComponent> {
        self.components.get(name).map(|component| component.as_ref())
    }
}

/// Asks each provider in order; the first one that knows the name wins.
#[derive(Default)]
pub struct ChainStepComponentProvider {
    providers: Vec<Box<dyn StepComponentProvider>>,
}

impl ChainStepComponentProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_provider(&mut self, provider: impl StepComponentProvider + 'static) {
        self.providers.push(Box::new(provider));
    }

    pub fn with(mut self, provider: impl StepComponentProvider + 'static) -> Self {
        self.add_provider(provider);
        self
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl StepComponentProvider for ChainStepComponentProvider {
    fn step_component(&self, name: &str) -> Option<&dyn StepComponent> {
        self.providers.iter().find_map(|provider| provider.step_component(name))
    }
}
