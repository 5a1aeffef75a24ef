//! Class loading and instrumentation
//!
//! - `class_def`: class definitions as they sit on the class path
//! - `class_path`: the immutable set of available classes
//! - `config`: which classes are acquired, instrumented and intercepted
//! - `class_loader`: system and per-sandbox loaders, loaded classes
//! - `instrumentor`: verification and rewriting of acquired classes

pub mod class_def;
pub mod class_loader;
pub mod class_path;
pub mod config;
pub mod instrumentor;

pub use class_def::{ClassDef, ClassDefBuilder, MethodDef};
pub use class_loader::{InitState, LoadedClass, LoadedMethod, SandboxClassLoader, SystemClassLoader};
pub use class_path::{ClassPath, ClassPathBuilder};
pub use config::{Builder as ConfigBuilder, InstrumentationConfiguration};
pub use instrumentor::ClassInstrumentor;
