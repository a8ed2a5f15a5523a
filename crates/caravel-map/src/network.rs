//! Network configurations.

use serde::{Deserialize, Serialize};

use crate::container::OptionsMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfiguration {
    pub driver: String,
    pub driver_options: OptionsMap,
    pub internal: bool,
    pub create_options: OptionsMap,
}

impl Default for NetworkConfiguration {
    fn default() -> Self {
        NetworkConfiguration {
            driver: "bridge".to_string(),
            driver_options: OptionsMap::new(),
            internal: false,
            create_options: OptionsMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_to_bridge_driver() {
        let config: NetworkConfiguration = serde_json::from_value(json!({})).unwrap();
        assert_eq!(config.driver, "bridge");
        assert!(!config.internal);
    }
}
