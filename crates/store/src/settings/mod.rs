//! Typed store settings and the pure evaluators built on them.
//!
//! Settings are stored as a flat map of key to JSON value. [`StoreSettings`]
//! parses that map once into typed fields; a value that fails validation
//! falls back to the field default and is reported as a
//! [`SettingsWarning`] instead of failing the whole record.
//!
//! # Keys
//!
//! | Key | Value |
//! |-----|-------|
//! | `store_name` | string |
//! | `announcement` | string |
//! | `contact_email` | email string |
//! | `delivery_zones` | array of `{name, cities, states, fee}` |
//! | `state_rates` | object of state name to fee |
//! | `default_delivery_fee` | number or numeric string |
//! | `free_delivery_threshold` | number or numeric string (0 disables) |
//! | `promo_codes` | array of promo code objects |
//!
//! camelCase spellings of the keys (`deliveryZones`, ...) are accepted when
//! reading.

pub mod delivery;
pub mod promo;

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use corner_shop_core::{Email, Price};

pub use delivery::{DeliveryQuote, DeliveryRequest, DeliveryRule, DeliverySettings, DeliveryZone, delivery_fee};
pub use promo::{DiscountKind, PromoCode, PromoDiscount, PromoRejection, apply_promo};

/// Longest accepted settings key.
pub const MAX_KEY_CHARS: usize = 100;

/// Canonical settings keys.
pub mod keys {
    pub const STORE_NAME: &str = "store_name";
    pub const ANNOUNCEMENT: &str = "announcement";
    pub const CONTACT_EMAIL: &str = "contact_email";
    pub const DELIVERY_ZONES: &str = "delivery_zones";
    pub const STATE_RATES: &str = "state_rates";
    pub const DEFAULT_DELIVERY_FEE: &str = "default_delivery_fee";
    pub const FREE_DELIVERY_THRESHOLD: &str = "free_delivery_threshold";
    pub const PROMO_CODES: &str = "promo_codes";

    /// Every key with a typed field.
    pub const ALL: [&str; 8] = [
        STORE_NAME,
        ANNOUNCEMENT,
        CONTACT_EMAIL,
        DELIVERY_ZONES,
        STATE_RATES,
        DEFAULT_DELIVERY_FEE,
        FREE_DELIVERY_THRESHOLD,
        PROMO_CODES,
    ];
}

/// A settings value that was ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsWarning {
    pub key: String,
    pub message: String,
}

impl std::fmt::Display for SettingsWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.key, self.message)
    }
}

/// Store settings with typed fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreSettings {
    pub store_name: Option<String>,
    pub announcement: Option<String>,
    pub contact_email: Option<Email>,
    pub delivery: DeliverySettings,
    pub promo_codes: Vec<PromoCode>,
}

impl StoreSettings {
    /// Parse the stored settings map.
    ///
    /// Never fails; rejected values are returned as warnings and the field
    /// keeps its default. Unknown keys are ignored.
    #[must_use]
    pub fn from_entries(entries: &Map<String, Value>) -> (Self, Vec<SettingsWarning>) {
        let mut parser = Parser {
            entries,
            warnings: Vec::new(),
        };

        let settings = Self {
            store_name: parser.field(keys::STORE_NAME, parse_text),
            announcement: parser.field(keys::ANNOUNCEMENT, parse_text),
            contact_email: parser.field(keys::CONTACT_EMAIL, parse_email),
            delivery: DeliverySettings {
                zones: parser
                    .partial_field(keys::DELIVERY_ZONES, parse_zones)
                    .unwrap_or_default(),
                state_rates: parser
                    .partial_field(keys::STATE_RATES, parse_state_rates)
                    .unwrap_or_default(),
                default_fee: parser
                    .field(keys::DEFAULT_DELIVERY_FEE, parse_price)
                    .unwrap_or(Price::ZERO),
                free_threshold: parser
                    .field(keys::FREE_DELIVERY_THRESHOLD, parse_price)
                    .unwrap_or(Price::ZERO),
            },
            promo_codes: parser
                .partial_field(keys::PROMO_CODES, parse_promo_codes)
                .unwrap_or_default(),
        };

        (settings, parser.warnings)
    }
}

/// Check that a value is acceptable for `key` before it is stored.
///
/// Keys without a typed field accept any value.
///
/// # Errors
///
/// Returns a description of the problem if the value would be rejected by
/// [`StoreSettings::from_entries`].
pub fn validate_value(key: &str, value: &Value) -> Result<(), String> {
    match key {
        keys::STORE_NAME | keys::ANNOUNCEMENT => parse_text(value).map(drop),
        keys::CONTACT_EMAIL => parse_email(value).map(drop),
        keys::DELIVERY_ZONES => strict(parse_zones(value)),
        keys::STATE_RATES => strict(parse_state_rates(value)),
        keys::DEFAULT_DELIVERY_FEE | keys::FREE_DELIVERY_THRESHOLD => parse_price(value).map(drop),
        keys::PROMO_CODES => strict(parse_promo_codes(value)),
        _ => Ok(()),
    }
}

/// Check a settings key.
///
/// # Errors
///
/// Returns a description of the problem if the key is empty or longer than
/// [`MAX_KEY_CHARS`].
pub fn validate_key(key: &str) -> Result<(), String> {
    let len = key.chars().count();
    if key.trim().is_empty() {
        return Err("key must not be empty".to_owned());
    }
    if len > MAX_KEY_CHARS {
        return Err(format!("key is {len} characters, limit is {MAX_KEY_CHARS}"));
    }
    Ok(())
}

// =============================================================================
// Field Parsers
// =============================================================================

/// Result of a collection parser: the accepted items and one message per
/// rejected item.
type Partial<T> = Result<(T, Vec<String>), String>;

struct Parser<'a> {
    entries: &'a Map<String, Value>,
    warnings: Vec<SettingsWarning>,
}

impl<'a> Parser<'a> {
    fn lookup(&self, key: &str) -> Option<(String, &'a Value)> {
        if let Some(value) = self.entries.get(key) {
            return Some((key.to_owned(), value));
        }
        let camel = to_camel_case(key);
        self.entries.get(&camel).map(|value| (camel, value))
    }

    fn field<T, P>(&mut self, key: &str, parse: P) -> Option<T>
    where
        P: FnOnce(&Value) -> Result<T, String>,
    {
        let (stored_key, value) = self.lookup(key)?;
        if value.is_null() {
            return None;
        }
        match parse(value) {
            Ok(parsed) => Some(parsed),
            Err(message) => {
                self.warn(stored_key, message);
                None
            }
        }
    }

    /// Like [`Parser::field`] for collection values: rejected items are
    /// dropped with a warning each and the rest are kept.
    fn partial_field<T, P>(&mut self, key: &str, parse: P) -> Option<T>
    where
        P: FnOnce(&Value) -> Partial<T>,
    {
        let (stored_key, value) = self.lookup(key)?;
        if value.is_null() {
            return None;
        }
        match parse(value) {
            Ok((accepted, rejected)) => {
                for message in rejected {
                    self.warn(stored_key.clone(), message);
                }
                Some(accepted)
            }
            Err(message) => {
                self.warn(stored_key, message);
                None
            }
        }
    }

    fn warn(&mut self, key: String, message: String) {
        tracing::warn!(key = %key, %message, "Ignoring invalid setting");
        self.warnings.push(SettingsWarning { key, message });
    }
}

fn to_camel_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut upper = false;
    for c in key.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

fn strict<T>(parsed: Partial<T>) -> Result<(), String> {
    let (_, rejected) = parsed?;
    if rejected.is_empty() {
        Ok(())
    } else {
        Err(rejected.join("; "))
    }
}

fn parse_text(value: &Value) -> Result<String, String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Ok(s.trim().to_owned()),
        Value::String(_) => Err("must not be blank".to_owned()),
        other => Err(format!("expected a string, got {other}")),
    }
}

fn parse_email(value: &Value) -> Result<Email, String> {
    let text = parse_text(value)?;
    Email::parse(&text).map_err(|e| e.to_string())
}

fn parse_price(value: &Value) -> Result<Price, String> {
    serde_json::from_value(value.clone()).map_err(|e| e.to_string())
}

/// Decode each element of an array, keeping the ones that decode.
fn parse_items<T: DeserializeOwned>(value: &Value, what: &str) -> Partial<Vec<T>> {
    let Value::Array(items) = value else {
        return Err(format!("expected an array of {what}"));
    };

    let mut accepted = Vec::with_capacity(items.len());
    let mut rejected = Vec::new();
    for (index, item) in items.iter().enumerate() {
        match serde_json::from_value(item.clone()) {
            Ok(parsed) => accepted.push(parsed),
            Err(e) => rejected.push(format!("{what} #{index}: {e}")),
        }
    }
    Ok((accepted, rejected))
}

fn parse_zones(value: &Value) -> Partial<Vec<DeliveryZone>> {
    let (zones, mut rejected) = parse_items::<DeliveryZone>(value, "zone")?;
    let zones = zones
        .into_iter()
        .filter(|zone| {
            if zone.cities.is_empty() && zone.states.is_empty() {
                rejected.push(format!("zone {:?} covers no city or state", zone.name));
                false
            } else {
                true
            }
        })
        .collect();
    Ok((zones, rejected))
}

fn parse_state_rates(value: &Value) -> Partial<BTreeMap<String, Price>> {
    let Value::Object(rates) = value else {
        return Err("expected an object of state to fee".to_owned());
    };

    let mut accepted = BTreeMap::new();
    let mut rejected = Vec::new();
    for (state, fee) in rates {
        match parse_price(fee) {
            Ok(fee) => {
                accepted.insert(state.trim().to_owned(), fee);
            }
            Err(e) => rejected.push(format!("rate for {state}: {e}")),
        }
    }
    Ok((accepted, rejected))
}

fn parse_promo_codes(value: &Value) -> Partial<Vec<PromoCode>> {
    let (codes, mut rejected) = parse_items::<PromoCode>(value, "promo code")?;
    let codes = codes
        .into_iter()
        .filter(|code| match code.validate() {
            Ok(()) => true,
            Err(e) => {
                rejected.push(format!("promo code {:?}: {e}", code.code));
                false
            }
        })
        .collect();
    Ok((codes, rejected))
}
