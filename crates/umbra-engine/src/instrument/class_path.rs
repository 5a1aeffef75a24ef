//! The set of classes available to sandboxes

use std::fmt;
use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};

use super::class_def::ClassDef;
use crate::error::ClassLoadError;

/// Immutable collection of class definitions, shared by every sandbox
#[derive(Clone, Default)]
pub struct ClassPath {
    classes: Arc<FxHashMap<String, Arc<ClassDef>>>,
}

impl ClassPath {
    /// Start an empty class path
    pub fn builder() -> ClassPathBuilder {
        ClassPathBuilder::default()
    }

    /// Definition of `name`
    pub fn get(&self, name: &str) -> Option<&Arc<ClassDef>> {
        self.classes.get(name)
    }

    /// Whether `name` is on the class path
    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    /// Every class name, unordered
    pub fn class_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.classes.keys().map(String::as_str)
    }

    /// Number of classes
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Check if the class path is empty
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

impl fmt::Debug for ClassPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassPath")
            .field("classes", &self.classes.len())
            .finish()
    }
}

/// Collects class definitions
#[derive(Default)]
pub struct ClassPathBuilder {
    classes: Vec<ClassDef>,
}

impl ClassPathBuilder {
    /// Add a class
    pub fn add(&mut self, def: ClassDef) -> &mut Self {
        self.classes.push(def);
        self
    }

    /// Add several classes
    pub fn add_all(&mut self, defs: impl IntoIterator<Item = ClassDef>) -> &mut Self {
        self.classes.extend(defs);
        self
    }

    /// Reject duplicates and superclass cycles, then freeze
    pub fn build(self) -> Result<ClassPath, ClassLoadError> {
        let mut classes: FxHashMap<String, Arc<ClassDef>> = FxHashMap::default();
        for def in self.classes {
            if classes.contains_key(&def.name) {
                return Err(ClassLoadError::Duplicate(def.name));
            }
            classes.insert(def.name.clone(), Arc::new(def));
        }
        check_cycles(&classes)?;
        Ok(ClassPath {
            classes: Arc::new(classes),
        })
    }
}

fn check_cycles(classes: &FxHashMap<String, Arc<ClassDef>>) -> Result<(), ClassLoadError> {
    let mut acyclic: FxHashSet<&str> = FxHashSet::default();
    for def in classes.values() {
        let mut chain: Vec<&str> = vec![def.name.as_str()];
        let mut current = def.superclass.as_deref();
        while let Some(name) = current {
            if acyclic.contains(name) {
                break;
            }
            if let Some(pos) = chain.iter().position(|c| *c == name) {
                let mut cycle: Vec<String> = chain[pos..].iter().map(|c| c.to_string()).collect();
                cycle.push(name.to_string());
                return Err(ClassLoadError::SuperclassCycle(cycle));
            }
            chain.push(name);
            current = classes.get(name).and_then(|c| c.superclass.as_deref());
        }
        acyclic.extend(chain);
    }
    Ok(())
}
