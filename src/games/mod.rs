pub mod catalog;
pub mod outcome;
pub mod types;

pub use catalog::{default_games, CatalogEntry, GameCatalog, GameDefinition, Integration};
pub use outcome::OutcomeGenerator;
pub use types::*;
