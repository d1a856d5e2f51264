use crate::args::SettingsArgs;
use crate::commands::Out;
use crate::model::{Location, Position};
use crate::{Result, Settings};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::debug;

/// The preferences as shown by the settings screen.
#[derive(Debug, Clone, Serialize)]
pub struct SettingsView {
    pub host: String,
    pub port: u16,
    pub persons: Vec<String>,
    pub food_budget: Decimal,
    pub default_position: Position,
    pub default_location: Location,
}

impl SettingsView {
    fn new(settings: &Settings) -> Self {
        Self {
            host: settings.host().to_string(),
            port: settings.port(),
            persons: settings.persons().to_vec(),
            food_budget: settings.food_budget().value(),
            default_position: settings.default_position().clone(),
            default_location: settings.default_location().clone(),
        }
    }
}

/// Applies the changes in `args` and saves them, then shows the resulting settings. Without any
/// changes it only shows them.
///
/// # Errors
/// - Returns an error if a value is invalid or if the settings cannot be written. Nothing is saved
///   in that case.
pub async fn settings(mut settings: Settings, args: SettingsArgs) -> Result<Out<SettingsView>> {
    if args.has_changes() {
        if let Some(host) = &args.host {
            settings.set_host(host)?;
        }
        if let Some(port) = args.port {
            settings.set_port(port)?;
        }
        if let Some(persons) = &args.persons {
            settings.set_persons(persons.as_slice());
        }
        if let Some(budget) = &args.food_budget {
            settings.set_food_budget(budget)?;
        }
        if let Some(position) = &args.default_position {
            settings.set_default_position(position.clone());
        }
        if let Some(location) = &args.default_location {
            settings.set_default_location(location.clone());
        }
        settings.save().await?;
        debug!("Saved '{}'", settings.settings_path().display());
    }

    let view = SettingsView::new(&settings);
    let persons = if view.persons.is_empty() {
        "(none)".to_string()
    } else {
        view.persons.join(", ")
    };
    let message = format!(
        "Backend: {}\nPersons: {persons}\nFood budget: {}\nDefault position: {}\nDefault location: {}",
        settings.base_url()?,
        settings.food_budget().grouped(),
        view.default_position,
        view.default_location,
    );
    Ok(Out::new(message, view))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::TestEnv;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_show_settings() {
        let env = TestEnv::new().await;
        let out = settings(env.settings(), SettingsArgs::default())
            .await
            .unwrap();
        assert!(out.message().contains("Persons: Bernd, Julia"));
        assert_eq!(out.structure().unwrap().food_budget, dec!(350));
    }

    #[tokio::test]
    async fn test_change_settings() {
        let env = TestEnv::new().await;
        let args = SettingsArgs {
            port: Some(9090),
            persons: Some(vec!["Anna".to_string()]),
            food_budget: Some("200".to_string()),
            default_location: Some(Location::Personal),
            ..SettingsArgs::default()
        };
        settings(env.settings(), args).await.unwrap();

        let loaded = Settings::load(env.settings().root()).await.unwrap();
        assert_eq!(loaded.port(), 9090);
        assert_eq!(loaded.persons(), &["Anna".to_string()]);
        assert_eq!(loaded.food_budget().value(), dec!(200));
        assert_eq!(loaded.default_location(), &Location::Personal);
    }

    #[tokio::test]
    async fn test_invalid_change_is_not_saved() {
        let env = TestEnv::new().await;
        let args = SettingsArgs {
            persons: Some(vec!["Anna".to_string()]),
            food_budget: Some("-5".to_string()),
            ..SettingsArgs::default()
        };
        assert!(settings(env.settings(), args).await.is_err());
        let loaded = Settings::load(env.settings().root()).await.unwrap();
        assert_eq!(loaded.persons().len(), 2);
    }
}
