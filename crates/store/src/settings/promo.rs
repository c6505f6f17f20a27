//! Promo code eligibility and discount calculation.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use corner_shop_core::Price;

/// How a promo code discounts a cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscountKind {
    /// `discount_value` percent of the subtotal.
    #[serde(alias = "percent")]
    Percentage,
    /// `discount_value` currency units off.
    #[serde(alias = "amount")]
    Fixed,
}

/// A promo code as configured in settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromoCode {
    pub code: String,
    pub discount_type: DiscountKind,
    /// Percent or currency units, per `discount_type`. Accepts numbers and
    /// numeric strings.
    #[serde(default)]
    pub discount_value: Option<Decimal>,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// Smallest subtotal the code applies to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_order: Option<Price>,
}

const fn default_active() -> bool {
    true
}

impl PromoCode {
    /// Check the configured values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        if self.code.trim().is_empty() {
            return Err("code must not be blank".to_owned());
        }
        match self.discount_value {
            None => Err("discountValue is required".to_owned()),
            Some(value) if value.is_sign_negative() && !value.is_zero() => {
                Err("discountValue must not be negative".to_owned())
            }
            Some(value)
                if self.discount_type == DiscountKind::Percentage
                    && value > Decimal::ONE_HUNDRED =>
            {
                Err("percentage discountValue must not exceed 100".to_owned())
            }
            Some(_) => Ok(()),
        }
    }

    fn matches(&self, code: &str) -> bool {
        self.code.trim().eq_ignore_ascii_case(code)
    }
}

/// Why a promo code was not applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PromoRejection {
    #[error("unknown promo code")]
    Unknown,

    #[error("promo code is not active")]
    Inactive,

    #[error("promo code has expired")]
    Expired,

    #[error("promo code requires a subtotal of at least {minimum}")]
    BelowMinimum { minimum: Price },
}

/// An applied promo code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromoDiscount {
    /// The code as configured.
    pub code: String,
    /// Amount taken off, between zero and the subtotal.
    pub discount: Price,
    /// Subtotal after the discount.
    pub total: Price,
}

/// Apply the promo code `code` to `subtotal` at time `now`.
///
/// Codes match trimmed and case-insensitively. The discount is clamped to
/// the subtotal and rounded to cents.
///
/// # Errors
///
/// Returns the reason the code does not apply.
pub fn apply_promo(
    codes: &[PromoCode],
    code: &str,
    subtotal: Price,
    now: DateTime<Utc>,
) -> Result<PromoDiscount, PromoRejection> {
    let code = code.trim();
    if code.is_empty() {
        return Err(PromoRejection::Unknown);
    }

    let promo = codes
        .iter()
        .find(|p| p.matches(code))
        .ok_or(PromoRejection::Unknown)?;

    if !promo.active {
        return Err(PromoRejection::Inactive);
    }
    if promo.expires_at.is_some_and(|expires_at| now > expires_at) {
        return Err(PromoRejection::Expired);
    }
    if let Some(minimum) = promo.min_order
        && subtotal < minimum
    {
        return Err(PromoRejection::BelowMinimum { minimum });
    }

    let value = promo.discount_value.unwrap_or_default().max(Decimal::ZERO);
    let raw = match promo.discount_type {
        DiscountKind::Percentage => {
            let percent = value.min(Decimal::ONE_HUNDRED);
            let amount = subtotal.amount();
            amount.checked_mul(percent).map_or_else(
                || amount / Decimal::ONE_HUNDRED * percent,
                |scaled| scaled / Decimal::ONE_HUNDRED,
            )
        }
        DiscountKind::Fixed => value,
    };
    let discount = Price::new(raw.min(subtotal.amount()).max(Decimal::ZERO))
        .unwrap_or(Price::ZERO)
        .round_cents();

    Ok(PromoDiscount {
        code: promo.code.trim().to_owned(),
        discount,
        total: subtotal - discount,
    })
}
