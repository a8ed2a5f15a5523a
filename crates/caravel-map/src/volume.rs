//! Volume configurations.

use caravel_core::Value;
use serde::de::{Deserializer, Error as DeError};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::container::OptionsMap;

/// Configuration of a volume alias. A plain string in the document is a
/// shorthand for the default container path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VolumeConfiguration {
    pub default_path: Option<Value<String>>,
    pub driver: String,
    pub driver_options: OptionsMap,
    pub create_options: OptionsMap,
    /// Owner applied during preparation; falls back to the attaching
    /// configuration's user.
    pub user: Option<Value<String>>,
    /// Permission flags applied during preparation, in `chmod` notation.
    pub permissions: Option<String>,
}

impl Default for VolumeConfiguration {
    fn default() -> Self {
        VolumeConfiguration {
            default_path: None,
            driver: "local".to_string(),
            driver_options: OptionsMap::new(),
            create_options: OptionsMap::new(),
            user: None,
            permissions: None,
        }
    }
}

impl VolumeConfiguration {
    pub fn with_path(path: impl Into<Value<String>>) -> Self {
        VolumeConfiguration {
            default_path: Some(path.into()),
            ..Default::default()
        }
    }
}

impl<'de> Deserialize<'de> for VolumeConfiguration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        fn de_user<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Value<String>>, D::Error> {
            let value = Json::deserialize(d)?;
            Ok(crate::input::user_string(&value)
                .map_err(DeError::custom)?
                .map(Into::into))
        }

        #[derive(Deserialize)]
        #[serde(default)]
        struct Full {
            default_path: Option<Value<String>>,
            driver: String,
            driver_options: OptionsMap,
            create_options: OptionsMap,
            #[serde(deserialize_with = "de_user")]
            user: Option<Value<String>>,
            permissions: Option<String>,
        }
        impl Default for Full {
            fn default() -> Self {
                Full {
                    default_path: None,
                    driver: "local".to_string(),
                    driver_options: OptionsMap::new(),
                    create_options: OptionsMap::new(),
                    user: None,
                    permissions: None,
                }
            }
        }

        let value = Json::deserialize(deserializer)?;
        match value {
            Json::String(path) => Ok(VolumeConfiguration::with_path(path)),
            other => {
                let full: Full = serde_json::from_value(other).map_err(DeError::custom)?;
                Ok(VolumeConfiguration {
                    default_path: full.default_path,
                    driver: full.driver,
                    driver_options: full.driver_options,
                    create_options: full.create_options,
                    user: full.user,
                    permissions: full.permissions,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn string_shorthand_sets_default_path() {
        let config: VolumeConfiguration = serde_json::from_value(json!("/var/run/app")).unwrap();
        assert_eq!(config.default_path.unwrap().resolve(), "/var/run/app");
        assert_eq!(config.driver, "local");
    }

    #[test]
    fn full_form_keeps_driver_and_preparation_settings() {
        let config: VolumeConfiguration = serde_json::from_value(json!({
            "default_path": "/data",
            "driver": "nfs",
            "driver_options": {"addr": "10.0.0.1"},
            "user": 1000,
            "permissions": "g+w",
        }))
        .unwrap();
        assert_eq!(config.driver, "nfs");
        assert_eq!(config.driver_options["addr"], json!("10.0.0.1"));
        assert_eq!(config.user.unwrap().resolve(), "1000");
        assert_eq!(config.permissions.as_deref(), Some("g+w"));
    }
}
