//! Game catalog
//!
//! Per-game configuration: RTP, reel layout, optional custom pay table and
//! how the client is launched. Each enabled game carries a prebuilt
//! [`OutcomeGenerator`].

use super::outcome::OutcomeGenerator;
use super::types::{PayTable, ReelLayout};
use crate::config::ConfigValidationError;
use crate::errors::{WageringError, WageringResult};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How a game client is started
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Integration {
    /// Hosted page embedded in an iframe
    Iframe { url: String },
    /// External provider with its own launch endpoint
    Provider { api_url: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameDefinition {
    pub game_id: String,
    pub name: String,
    pub layout: ReelLayout,
    /// Target return to player, in percent
    pub rtp: Decimal,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub integration: Integration,
    /// Overrides the layout's default pay table
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pay_table: Option<PayTable>,
}

fn default_enabled() -> bool {
    true
}

impl GameDefinition {
    pub fn pay_table(&self) -> PayTable {
        self.pay_table
            .clone()
            .unwrap_or_else(|| self.layout.pay_table())
    }

    pub fn launch_url(&self, token: &str, demo: bool) -> String {
        match &self.integration {
            Integration::Iframe { url } => format!("{}?session={}&demo={}", url, token, demo),
            Integration::Provider { api_url } => format!(
                "{}/launch?game={}&session={}&demo={}",
                api_url.trim_end_matches('/'),
                self.game_id,
                token,
                demo
            ),
        }
    }
}

fn with_game_id(game_id: &str, error: ConfigValidationError) -> ConfigValidationError {
    match error {
        ConfigValidationError::InvalidValue(msg) => {
            ConfigValidationError::InvalidValue(format!("game {}: {}", game_id, msg))
        }
        ConfigValidationError::LogicalInconsistency(msg) => {
            ConfigValidationError::LogicalInconsistency(format!("game {}: {}", game_id, msg))
        }
        ConfigValidationError::MissingRequired(msg) => {
            ConfigValidationError::MissingRequired(format!("game {}: {}", game_id, msg))
        }
    }
}

/// Catalog entry with its ready-to-use generator
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub definition: GameDefinition,
    pub generator: OutcomeGenerator,
}

#[derive(Debug, Clone, Default)]
pub struct GameCatalog {
    games: HashMap<String, CatalogEntry>,
}

impl GameCatalog {
    pub fn from_definitions(
        definitions: impl IntoIterator<Item = GameDefinition>,
    ) -> Result<Self, ConfigValidationError> {
        let mut games = HashMap::new();
        for definition in definitions {
            if definition.layout.reels() != definition.pay_table().reels {
                return Err(ConfigValidationError::LogicalInconsistency(format!(
                    "game {} is {} but its pay table has {} reels",
                    definition.game_id,
                    definition.layout,
                    definition.pay_table().reels
                )));
            }
            let generator = OutcomeGenerator::new(definition.pay_table(), definition.rtp)
                .map_err(|e| with_game_id(&definition.game_id, e))?;
            let id = definition.game_id.clone();
            if games
                .insert(id.clone(), CatalogEntry { definition, generator })
                .is_some()
            {
                return Err(ConfigValidationError::InvalidValue(format!(
                    "duplicate game id {}",
                    id
                )));
            }
        }
        Ok(Self { games })
    }

    /// Catalog entry for any known game, enabled or not
    pub fn get(&self, game_id: &str) -> WageringResult<&CatalogEntry> {
        self.games
            .get(game_id)
            .ok_or_else(|| WageringError::GameNotFound(game_id.to_string()))
    }

    /// Catalog entry for a game that may currently be played
    pub fn playable(&self, game_id: &str) -> WageringResult<&CatalogEntry> {
        let entry = self.get(game_id)?;
        if !entry.definition.enabled {
            return Err(WageringError::GameUnavailable(game_id.to_string()));
        }
        Ok(entry)
    }

    pub fn len(&self) -> usize {
        self.games.len()
    }

    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }

    pub fn definitions(&self) -> impl Iterator<Item = &GameDefinition> {
        self.games.values().map(|e| &e.definition)
    }
}

/// Games available out of the box
pub fn default_games() -> Vec<GameDefinition> {
    vec![
        GameDefinition {
            game_id: "classic-fruits".to_string(),
            name: "Classic Fruits".to_string(),
            layout: ReelLayout::ThreeReel,
            rtp: dec!(96.50),
            enabled: true,
            integration: Integration::Iframe {
                url: "https://games.local/classic-fruits".to_string(),
            },
            pay_table: None,
        },
        GameDefinition {
            game_id: "lucky-fives".to_string(),
            name: "Lucky Fives".to_string(),
            layout: ReelLayout::FiveReel,
            rtp: dec!(96.50),
            enabled: true,
            integration: Integration::Iframe {
                url: "https://games.local/lucky-fives".to_string(),
            },
            pay_table: None,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_catalog_builds() {
        let catalog = GameCatalog::from_definitions(default_games()).unwrap();
        assert_eq!(catalog.len(), 2);
        assert!(catalog.playable("classic-fruits").is_ok());
        assert!(matches!(
            catalog.get("missing"),
            Err(WageringError::GameNotFound(_))
        ));
    }

    #[test]
    fn test_disabled_game_is_not_playable() {
        let mut games = default_games();
        games[0].enabled = false;
        let catalog = GameCatalog::from_definitions(games).unwrap();
        assert!(matches!(
            catalog.playable("classic-fruits"),
            Err(WageringError::GameUnavailable(_))
        ));
    }

    #[test]
    fn test_launch_urls() {
        let mut game = default_games().remove(0);
        assert_eq!(
            game.launch_url("abc", false),
            "https://games.local/classic-fruits?session=abc&demo=false"
        );
        game.integration = Integration::Provider {
            api_url: "https://provider.example/api/".to_string(),
        };
        assert_eq!(
            game.launch_url("abc", true),
            "https://provider.example/api/launch?game=classic-fruits&session=abc&demo=true"
        );
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let mut games = default_games();
        games.push(games[0].clone());
        assert!(GameCatalog::from_definitions(games).is_err());
    }

    #[test]
    fn test_layout_and_table_must_agree() {
        let mut games = default_games();
        games[0].pay_table = Some(PayTable::five_reel());
        assert!(GameCatalog::from_definitions(games).is_err());
    }

    #[test]
    fn test_definition_from_toml() {
        let toml_src = r#"
            game_id = "neon"
            name = "Neon"
            layout = "five_reel"
            rtp = "95.00"
            integration = { type = "provider", api_url = "https://p.example" }
        "#;
        let game: GameDefinition = toml::from_str(toml_src).unwrap();
        assert!(game.enabled);
        assert_eq!(game.layout, ReelLayout::FiveReel);
        assert_eq!(game.rtp, dec!(95));
    }
}
