//! Bot-profile and venue-settings files.
//!
//! Profiles are YAML keyed by bot id; venue settings are one JSON file per
//! exchange giving each pair its tick size, quantity increment and fee
//! rates. Both are loaded once at startup.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Deserializer};

use crate::entities::{Account, MarketInfo, PairSpec, Token};
use crate::error::ConfigError;

#[derive(Debug, Clone, Deserialize)]
pub struct BotProfile {
    pub strategy_file: String,
    pub exchange_bases: Vec<ExchangeProfile>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeProfile {
    pub exchange_name: String,
    #[serde(default = "default_exchange_type")]
    pub exchange_type: String,
    pub account: AccountProfile,
    pub pairs: Vec<PairProfile>,
}

fn default_exchange_type() -> String {
    "spot".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountProfile {
    pub api_key: String,
    pub secret_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PairProfile {
    pub base_asset: String,
    pub quote_asset: String,
    #[serde(default)]
    pub symbol: Option<String>,
}

/// Per-pair venue parameters. Venues publish these as strings as often as
/// numbers, so both spellings are accepted.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PairSettings {
    #[serde(deserialize_with = "de_f64")]
    pub tick_size: f64,
    #[serde(deserialize_with = "de_f64")]
    pub quantity_increment: f64,
    #[serde(deserialize_with = "de_f64")]
    pub take_rate: f64,
    #[serde(deserialize_with = "de_f64")]
    pub make_rate: f64,
}

fn de_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumOrStr {
        Num(f64),
        Str(String),
    }
    match NumOrStr::deserialize(deserializer)? {
        NumOrStr::Num(n) => Ok(n),
        NumOrStr::Str(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })
}

/// All bot profiles, keyed by bot id.
pub fn load_profiles(path: &Path) -> Result<HashMap<String, BotProfile>, ConfigError> {
    let raw = read_file(path)?;
    serde_yaml::from_str(&raw).map_err(|err| ConfigError::Parse {
        path: path.display().to_string(),
        reason: err.to_string(),
    })
}

pub fn load_bot_profile(path: &Path, bot_id: &str) -> Result<BotProfile, ConfigError> {
    let mut profiles = load_profiles(path)?;
    profiles
        .remove(bot_id)
        .ok_or_else(|| ConfigError::NoSuchBot(bot_id.to_string()))
}

/// The venue-settings file for one exchange: trading_pair -> parameters.
pub fn load_venue_settings(
    dir: &Path,
    venue: &str,
) -> Result<HashMap<String, PairSettings>, ConfigError> {
    let path = dir.join(format!("{}.json", venue.to_uppercase()));
    let raw = read_file(&path)?;
    serde_json::from_str(&raw).map_err(|err| ConfigError::Parse {
        path: path.display().to_string(),
        reason: err.to_string(),
    })
}

/// Turn one profile entry into a [`MarketInfo`], enriching each pair with
/// its venue parameters. A pair missing from the venue file is fatal.
pub fn build_market_info(
    profile: &ExchangeProfile,
    venue_settings: &HashMap<String, PairSettings>,
) -> Result<MarketInfo, ConfigError> {
    let mut pairs = Vec::with_capacity(profile.pairs.len());
    for p in &profile.pairs {
        let mut spec = PairSpec::new(
            Token::new(&p.base_asset),
            Token::new(&p.quote_asset),
            p.symbol.clone(),
        );
        let settings = venue_settings.get(&spec.trading_pair).ok_or_else(|| {
            ConfigError::MissingPairSettings {
                venue: profile.exchange_name.to_uppercase(),
                pair: spec.trading_pair.clone(),
            }
        })?;
        spec.tick_size = settings.tick_size;
        spec.quantity_increment = settings.quantity_increment;
        spec.taker_rate = settings.take_rate;
        spec.maker_rate = settings.make_rate;
        pairs.push(spec);
    }
    Ok(MarketInfo::new(
        &profile.exchange_name,
        pairs,
        Account::new(
            profile.account.api_key.clone(),
            profile.account.secret_key.clone(),
        ),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROFILE_YAML: &str = r#"
"5":
  strategy_file: MM
  exchange_bases:
    - exchange_name: FMFW
      exchange_type: spot
      account:
        api_key: k
        secret_key: s
      pairs:
        - { base_asset: ETH, quote_asset: USDT }
"#;

    const VENUE_JSON: &str = r#"
{
  "ETHUSDT": {
    "tick_size": "0.01",
    "quantity_increment": 0.001,
    "take_rate": "0.0025",
    "make_rate": 0.001
  }
}
"#;

    #[test]
    fn profile_yaml_parses() {
        let profiles: HashMap<String, BotProfile> = serde_yaml::from_str(PROFILE_YAML).unwrap();
        let profile = &profiles["5"];
        assert_eq!(profile.strategy_file, "MM");
        assert_eq!(profile.exchange_bases.len(), 1);
        let ex = &profile.exchange_bases[0];
        assert_eq!(ex.exchange_name, "FMFW");
        assert_eq!(ex.exchange_type, "spot");
        assert_eq!(ex.pairs[0].base_asset, "ETH");
    }

    #[test]
    fn venue_settings_accept_strings_and_numbers() {
        let settings: HashMap<String, PairSettings> = serde_json::from_str(VENUE_JSON).unwrap();
        let s = settings["ETHUSDT"];
        assert!((s.tick_size - 0.01).abs() < 1e-12);
        assert!((s.quantity_increment - 0.001).abs() < 1e-12);
        assert!((s.take_rate - 0.0025).abs() < 1e-12);
    }

    #[test]
    fn market_info_enriches_pairs() {
        let profiles: HashMap<String, BotProfile> = serde_yaml::from_str(PROFILE_YAML).unwrap();
        let settings: HashMap<String, PairSettings> = serde_json::from_str(VENUE_JSON).unwrap();
        let info = build_market_info(&profiles["5"].exchange_bases[0], &settings).unwrap();
        assert_eq!(info.exchange, "FMFW");
        let spec = &info.pairs[0];
        assert_eq!(spec.trading_pair, "ETHUSDT");
        assert!((spec.tick_size - 0.01).abs() < 1e-12);
        assert!((spec.maker_rate - 0.001).abs() < 1e-12);
    }

    #[test]
    fn missing_pair_settings_is_fatal() {
        let profiles: HashMap<String, BotProfile> = serde_yaml::from_str(PROFILE_YAML).unwrap();
        let empty = HashMap::new();
        assert!(matches!(
            build_market_info(&profiles["5"].exchange_bases[0], &empty),
            Err(ConfigError::MissingPairSettings { .. })
        ));
    }
}
