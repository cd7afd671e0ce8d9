pub mod deps;
pub mod diag;
pub mod error;
pub mod id;
pub mod local_vars;
pub mod mode;
pub mod seed;
pub mod settings;
pub mod state;

// Re-export commonly used types
pub use deps::{DepKey, Dependencies, EdgeKind, Referent, Referents};
pub use diag::StateReport;
pub use error::StateError;
pub use id::SeedId;
pub use local_vars::{Binding, LocalVars};
pub use mode::{should_bind, Boundary, Mode};
pub use seed::{Compile, Compiled, ResultSlot, Seed, SeedNode, TypedSeed};
pub use settings::{PlatformFunctions, RustPlatform, StateSettings};
pub use state::{Compilation, Region, State, Statement};
