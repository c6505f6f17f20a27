//! Delivery fee resolution.
//!
//! Resolution order, first match wins:
//!
//! 1. Free delivery when a threshold is set and the cart total reaches it
//! 2. A zone listing the exact city
//! 3. A zone listing the exact state
//! 4. A flat rate for the state
//! 5. The default fee
//!
//! City and state names match trimmed and case-insensitively.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use corner_shop_core::Price;

/// An admin-defined group of locations sharing a delivery fee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryZone {
    pub name: String,
    #[serde(default)]
    pub cities: Vec<String>,
    #[serde(default)]
    pub states: Vec<String>,
    pub fee: Price,
}

/// Delivery settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliverySettings {
    pub zones: Vec<DeliveryZone>,
    /// Flat fee per state name.
    pub state_rates: BTreeMap<String, Price>,
    pub default_fee: Price,
    /// Cart total from which delivery is free. Zero disables free delivery.
    pub free_threshold: Price,
}

/// Where an order is going and what it is worth.
#[derive(Debug, Clone, Copy)]
pub struct DeliveryRequest<'a> {
    pub state: &'a str,
    pub city: &'a str,
    pub cart_total: Price,
}

/// Which rule produced a delivery fee.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryRule {
    FreeThreshold,
    CityZone { zone: String },
    StateZone { zone: String },
    StateRate { state: String },
    Default,
}

/// A resolved delivery fee.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryQuote {
    pub fee: Price,
    pub rule: DeliveryRule,
}

/// Resolve the delivery fee for a request.
#[must_use]
pub fn delivery_fee(settings: &DeliverySettings, request: &DeliveryRequest<'_>) -> DeliveryQuote {
    if settings.free_threshold > Price::ZERO && request.cart_total >= settings.free_threshold {
        return DeliveryQuote {
            fee: Price::ZERO,
            rule: DeliveryRule::FreeThreshold,
        };
    }

    let city = request.city.trim();
    if !city.is_empty()
        && let Some(zone) = settings
            .zones
            .iter()
            .find(|zone| zone.cities.iter().any(|c| same_place(c, city)))
    {
        return DeliveryQuote {
            fee: zone.fee,
            rule: DeliveryRule::CityZone {
                zone: zone.name.clone(),
            },
        };
    }

    let state = request.state.trim();
    if !state.is_empty() {
        if let Some(zone) = settings
            .zones
            .iter()
            .find(|zone| zone.states.iter().any(|s| same_place(s, state)))
        {
            return DeliveryQuote {
                fee: zone.fee,
                rule: DeliveryRule::StateZone {
                    zone: zone.name.clone(),
                },
            };
        }

        if let Some((name, fee)) = settings
            .state_rates
            .iter()
            .find(|(name, _)| same_place(name, state))
        {
            return DeliveryQuote {
                fee: *fee,
                rule: DeliveryRule::StateRate {
                    state: name.clone(),
                },
            };
        }
    }

    DeliveryQuote {
        fee: settings.default_fee,
        rule: DeliveryRule::Default,
    }
}

fn same_place(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}
