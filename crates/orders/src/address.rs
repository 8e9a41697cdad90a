//! Shipping address normalization
//!
//! Checkout clients have sent addresses under several field-name schemes over
//! time (`street`/`addressLine1`/`streetAddress`, `zipCode`/`postalCode`,
//! `firstName`+`lastName` vs `fullName`). [`normalize_address`] folds any of
//! them into one [`ShippingAddress`]; serializing it writes every known alias
//! with the same value so readers on any scheme agree.
//!
//! Normalization is total and idempotent.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const STREET_KEYS: &[&str] = &["street", "addressLine1", "streetAddress", "address1", "line1"];
const LINE2_KEYS: &[&str] = &["addressLine2", "line2", "address2", "apartment"];
const CITY_KEYS: &[&str] = &["city", "town"];
const STATE_KEYS: &[&str] = &["state", "province", "region"];
const POSTAL_KEYS: &[&str] = &["zipCode", "postalCode", "zip", "postcode"];
const COUNTRY_KEYS: &[&str] = &["country", "countryCode"];
const FULL_NAME_KEYS: &[&str] = &["fullName", "name"];
const FIRST_NAME_KEYS: &[&str] = &["firstName"];
const LAST_NAME_KEYS: &[&str] = &["lastName"];
const PHONE_KEYS: &[&str] = &["phone", "phoneNumber"];

/// Canonical shipping address
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Value", into = "AddressWire")]
pub struct ShippingAddress {
    pub street: String,
    pub line2: Option<String>,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
    pub full_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
}

impl ShippingAddress {
    /// Street, city and country are the minimum a carrier needs
    pub fn is_complete(&self) -> bool {
        !self.street.is_empty() && !self.city.is_empty() && !self.country.is_empty()
    }

    /// Fields still missing for [`is_complete`](Self::is_complete)
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.street.is_empty() {
            missing.push("street");
        }
        if self.city.is_empty() {
            missing.push("city");
        }
        if self.country.is_empty() {
            missing.push("country");
        }
        missing
    }
}

impl From<Value> for ShippingAddress {
    fn from(value: Value) -> Self {
        normalize_address(&value)
    }
}

/// Fold any legacy address shape into the canonical one
pub fn normalize_address(raw: &Value) -> ShippingAddress {
    let obj = match raw {
        Value::Object(obj) => obj,
        // A bare string is treated as the street line
        Value::String(s) => {
            return ShippingAddress {
                street: s.trim().to_string(),
                ..Default::default()
            }
        }
        _ => return ShippingAddress::default(),
    };

    let first = text(obj, FIRST_NAME_KEYS);
    let last = text(obj, LAST_NAME_KEYS);
    let full_name = text(obj, FULL_NAME_KEYS).or_else(|| join_name(first.as_deref(), last.as_deref()));
    let (first_name, last_name) = match (first, last) {
        (None, None) => split_name(full_name.as_deref()),
        given => given,
    };

    ShippingAddress {
        street: text(obj, STREET_KEYS).unwrap_or_default(),
        line2: text(obj, LINE2_KEYS),
        city: text(obj, CITY_KEYS).unwrap_or_default(),
        state: text(obj, STATE_KEYS).unwrap_or_default(),
        postal_code: text(obj, POSTAL_KEYS).unwrap_or_default(),
        country: text(obj, COUNTRY_KEYS).unwrap_or_default(),
        full_name,
        first_name,
        last_name,
        phone: text(obj, PHONE_KEYS),
    }
}

/// First non-blank value among `keys`; numbers are accepted (zip codes)
fn text(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match obj.get(*key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn join_name(first: Option<&str>, last: Option<&str>) -> Option<String> {
    match (first, last) {
        (Some(f), Some(l)) => Some(format!("{} {}", f, l)),
        (Some(f), None) => Some(f.to_string()),
        (None, Some(l)) => Some(l.to_string()),
        (None, None) => None,
    }
}

fn split_name(full: Option<&str>) -> (Option<String>, Option<String>) {
    let Some(full) = full else {
        return (None, None);
    };
    match full.split_once(char::is_whitespace) {
        Some((first, rest)) if !rest.trim().is_empty() => {
            (Some(first.to_string()), Some(rest.trim().to_string()))
        }
        _ => (Some(full.to_string()), None),
    }
}

/// Serialized form: canonical fields plus every legacy alias
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AddressWire {
    street: String,
    address_line1: String,
    street_address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    address_line2: Option<String>,
    city: String,
    state: String,
    zip_code: String,
    postal_code: String,
    country: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    phone: Option<String>,
}

impl From<ShippingAddress> for AddressWire {
    fn from(a: ShippingAddress) -> Self {
        Self {
            address_line1: a.street.clone(),
            street_address: a.street.clone(),
            street: a.street,
            address_line2: a.line2,
            city: a.city,
            state: a.state,
            zip_code: a.postal_code.clone(),
            postal_code: a.postal_code,
            country: a.country,
            full_name: a.full_name,
            first_name: a.first_name,
            last_name: a.last_name,
            phone: a.phone,
        }
    }
}
