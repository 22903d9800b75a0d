//! Checkout requests and their validated form.

use common::{CustomerId, PaymentMethod, ProductId, StoreId};
use serde::Deserialize;

use crate::error::{FieldError, OrderError};

const MAX_TEXT_LEN: usize = 255;
const MAX_PHONE_LEN: usize = 32;

/// Whether the entry point insists on a phone number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhoneRequirement {
    Required,
    Optional,
}

/// One requested product line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct CheckoutLine {
    pub product_id: ProductId,
    pub quantity: u32,
}

impl CheckoutLine {
    pub fn new(product_id: ProductId, quantity: u32) -> Self {
        Self {
            product_id,
            quantity,
        }
    }
}

/// An unvalidated checkout, as submitted by a shopper.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckoutRequest {
    #[serde(default)]
    pub customer_name: String,
    #[serde(default)]
    pub customer_email: String,
    #[serde(default)]
    pub customer_phone: Option<String>,
    #[serde(default)]
    pub customer_address: String,
    #[serde(default)]
    pub items: Vec<CheckoutLine>,
    #[serde(default)]
    pub payment_method: String,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Contact and shipping details snapshotted onto the order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactDetails {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: String,
}

/// A checkout that passed field validation and is ready to be priced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkout {
    pub store_id: StoreId,
    pub customer_id: Option<CustomerId>,
    pub contact: ContactDetails,
    pub lines: Vec<CheckoutLine>,
    pub payment_method: PaymentMethod,
    pub notes: Option<String>,
}

impl CheckoutRequest {
    /// Checks every field and collects all failures before returning.
    ///
    /// Text fields are trimmed; blank optional fields become `None`.
    pub fn validate(
        self,
        store_id: StoreId,
        customer_id: Option<CustomerId>,
        phone: PhoneRequirement,
    ) -> Result<Checkout, OrderError> {
        let mut fields = Vec::new();

        let name = required_text(&mut fields, "customer_name", &self.customer_name);

        let email = required_text(&mut fields, "customer_email", &self.customer_email);
        if !email.is_empty() && !looks_like_email(&email) {
            fields.push(FieldError::new(
                "customer_email",
                "must be a valid email address",
            ));
        }

        let customer_phone = optional_text(self.customer_phone);
        match &customer_phone {
            None if phone == PhoneRequirement::Required => {
                fields.push(FieldError::new("customer_phone", "is required"));
            }
            Some(number) if number.chars().count() > MAX_PHONE_LEN => {
                fields.push(FieldError::new(
                    "customer_phone",
                    format!("must be at most {MAX_PHONE_LEN} characters"),
                ));
            }
            _ => {}
        }

        let address = self.customer_address.trim().to_string();
        if address.is_empty() {
            fields.push(FieldError::new("customer_address", "is required"));
        }

        if self.items.is_empty() {
            fields.push(FieldError::new("items", "at least one item is required"));
        }
        for (index, line) in self.items.iter().enumerate() {
            if line.quantity == 0 {
                fields.push(FieldError::new(
                    format!("items.{index}.quantity"),
                    "must be at least 1",
                ));
            }
        }

        let payment_method = match self.payment_method.trim().parse::<PaymentMethod>() {
            Ok(method) => Some(method),
            Err(_) => {
                fields.push(FieldError::new(
                    "payment_method",
                    "must be one of stripe, fpx, cod",
                ));
                None
            }
        };

        match payment_method {
            Some(payment_method) if fields.is_empty() => Ok(Checkout {
                store_id,
                customer_id,
                contact: ContactDetails {
                    name,
                    email,
                    phone: customer_phone,
                    address,
                },
                lines: self.items,
                payment_method,
                notes: optional_text(self.notes),
            }),
            _ => Err(OrderError::ValidationFailed { fields }),
        }
    }
}

fn required_text(fields: &mut Vec<FieldError>, field: &str, value: &str) -> String {
    let value = value.trim();
    if value.is_empty() {
        fields.push(FieldError::new(field, "is required"));
    } else if value.chars().count() > MAX_TEXT_LEN {
        fields.push(FieldError::new(
            field,
            format!("must be at most {MAX_TEXT_LEN} characters"),
        ));
    }
    value.to_string()
}

fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn looks_like_email(value: &str) -> bool {
    match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && !domain.is_empty() && !domain.contains('@')
        }
        None => false,
    }
}
