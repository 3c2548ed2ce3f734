//! Name-keyed registry of scraping APIs.

use std::collections::HashMap;
use std::fmt;

use tracing::{debug, error};

use super::{ApiDefinition, ScraperApi};

/// Holds one [`ScraperApi`] per registered name.
///
/// Registering a name again replaces the previous instance and its state.
#[derive(Default)]
pub struct Dispatcher {
    apis: HashMap<String, ScraperApi>,
}

impl Dispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `definition` under its reported name.
    pub fn add_api(&mut self, definition: impl ApiDefinition + 'static) -> &mut Self {
        self.add_boxed(Box::new(definition))
    }

    /// Registers an already boxed definition.
    pub fn add_boxed(&mut self, definition: Box<dyn ApiDefinition>) -> &mut Self {
        let api = ScraperApi::new(definition);
        let name = api.name().to_string();
        if self.apis.insert(name.clone(), api).is_some() {
            debug!(name = %name, "replacing registered API");
        } else {
            debug!(name = %name, "registering API");
        }
        self
    }

    /// Registers several definitions in order.
    pub fn add_apis<I>(&mut self, definitions: I) -> &mut Self
    where
        I: IntoIterator<Item = Box<dyn ApiDefinition>>,
    {
        for definition in definitions {
            self.add_boxed(definition);
        }
        self
    }

    /// Looks up an API; a miss is logged.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ScraperApi> {
        let api = self.apis.get(name);
        if api.is_none() {
            error!(name, "no API configured with this name");
        }
        api
    }

    /// Mutable lookup; a miss is logged.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut ScraperApi> {
        let api = self.apis.get_mut(name);
        if api.is_none() {
            error!(name, "no API configured with this name");
        }
        api
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.apis.contains_key(name)
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.apis.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.apis.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.apis.is_empty()
    }

    /// Unregisters `name`, returning its state.
    pub fn remove(&mut self, name: &str) -> Option<ScraperApi> {
        self.apis.remove(name)
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("apis", &self.names())
            .finish()
    }
}
