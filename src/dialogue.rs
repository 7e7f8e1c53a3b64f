//! Conversation state for the admin and shop flows.
//!
//! Every chat holds one [`State`]. Each step of a flow is its own variant
//! carrying exactly the data collected so far. Checkout transitions are the
//! pure function [`ShopStep::advance`]; handlers only render its result.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use teloxide::dispatching::dialogue::{Dialogue, ErasedStorage};

use crate::db::Product;
use crate::errors::ShopError;

pub const MAX_CATEGORY_NAME_CHARS: usize = 15;
pub const MAX_PRODUCT_NAME_CHARS: usize = 15;
pub const MAX_DESCRIPTION_CHARS: usize = 100;
/// Upper bound for a product price in roubles
pub const MAX_PRICE: i64 = 1_000_000;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum State {
    #[default]
    Idle,
    Admin(AdminStep),
    Shop(ShopStep),
}

/// Dialogue over whichever storage `main` picked (memory or Redis)
pub type ShopDialogue = Dialogue<State, ErasedStorage<State>>;

// Erased storage reports boxed errors, which `?` cannot lift into anyhow.

pub async fn load_state(dialogue: &ShopDialogue) -> Result<State> {
    let state = dialogue
        .get()
        .await
        .map_err(|e| anyhow!(e).context("Failed to load conversation state"))?;
    Ok(state.unwrap_or_default())
}

pub async fn save_state(dialogue: &ShopDialogue, state: State) -> Result<()> {
    dialogue
        .update(state)
        .await
        .map_err(|e| anyhow!(e).context("Failed to save conversation state"))
}

pub async fn reset_state(dialogue: &ShopDialogue) -> Result<()> {
    dialogue
        .exit()
        .await
        .map_err(|e| anyhow!(e).context("Failed to reset conversation state"))
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum AdminStep {
    AddCategoryName,
    ChangeCategoryPick,
    ChangeCategoryName {
        category_id: i64,
    },
    DeleteCategoryPick,
    AddProductCategory,
    AddProductName {
        category_id: i64,
    },
    AddProductDescription {
        category_id: i64,
        name: String,
    },
    AddProductPrice {
        category_id: i64,
        name: String,
        description: String,
    },
    AddProductPhoto {
        category_id: i64,
        name: String,
        description: String,
        price: i64,
    },
    DeleteProductCategory,
    DeleteProductPick {
        category_id: i64,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryMethod {
    Delivery,
    Pickup,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentMethod {
    Online,
    Cash,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Address {
    Text(String),
    Location { latitude: f64, longitude: f64 },
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Text(text) => f.write_str(text),
            Address::Location {
                latitude,
                longitude,
            } => write!(f, "{latitude:.6}, {longitude:.6}"),
        }
    }
}

/// Everything chosen during checkout
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderDraft {
    /// Amount to pay in roubles
    pub total: i64,
    pub delivery: DeliveryMethod,
    pub payment: PaymentMethod,
    pub address: Option<Address>,
}

impl OrderDraft {
    /// Invoice amount in the smallest currency unit (kopecks)
    pub fn amount_minor_units(&self) -> Result<i64, ShopError> {
        self.total.checked_mul(100).ok_or(ShopError::AmountOverflow)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ShopStep {
    Browsing {
        category_id: i64,
        products: Vec<Product>,
        page: usize,
    },
    CartReview {
        total: i64,
    },
    DeliveryMethod {
        total: i64,
    },
    PaymentMethod {
        total: i64,
        delivery: DeliveryMethod,
    },
    AddressOption {
        order: OrderDraft,
    },
    EnterAddress {
        order: OrderDraft,
    },
    ShareLocation {
        order: OrderDraft,
    },
    Confirmation {
        order: OrderDraft,
    },
    AwaitingPayment {
        order: OrderDraft,
    },
}

/// Inputs that move a checkout forward
#[derive(Clone, Debug, PartialEq)]
pub enum CheckoutEvent {
    GoToPay,
    ChooseDelivery(DeliveryMethod),
    ChoosePayment(PaymentMethod),
    EnterAddressManually,
    ShareLocation,
    AddressText(String),
    Location { latitude: f64, longitude: f64 },
    Confirm,
}

/// What the handler has to do after a checkout event
#[derive(Clone, Debug, PartialEq)]
pub enum Transition {
    /// Store the new step and render its prompt
    Next(ShopStep),
    /// Cash order confirmed: acknowledge and end the conversation
    OrderPlaced(OrderDraft),
}

/// The event is not valid for the current step
#[derive(Clone, Debug, PartialEq)]
pub struct InvalidTransition;

impl ShopStep {
    /// Every step from the cart review on carries a cart total
    pub fn is_checkout(&self) -> bool {
        !matches!(self, ShopStep::Browsing { .. })
    }

    /// Cart total this step was computed from
    pub fn cart_total(&self) -> Option<i64> {
        match self {
            ShopStep::Browsing { .. } => None,
            ShopStep::CartReview { total }
            | ShopStep::DeliveryMethod { total }
            | ShopStep::PaymentMethod { total, .. } => Some(*total),
            ShopStep::AddressOption { order }
            | ShopStep::EnterAddress { order }
            | ShopStep::ShareLocation { order }
            | ShopStep::Confirmation { order }
            | ShopStep::AwaitingPayment { order } => Some(order.total),
        }
    }

    /// The cart no longer sums to the total this step carries
    pub fn is_stale(&self, current_total: i64) -> bool {
        self.cart_total().is_some_and(|total| total != current_total)
    }

    pub fn advance(self, event: CheckoutEvent) -> Result<Transition, InvalidTransition> {
        use CheckoutEvent as E;
        use ShopStep as S;

        let next = match (self, event) {
            (S::CartReview { total }, E::GoToPay) => S::DeliveryMethod { total },
            (S::DeliveryMethod { total }, E::ChooseDelivery(delivery)) => {
                S::PaymentMethod { total, delivery }
            }
            (S::PaymentMethod { total, delivery }, E::ChoosePayment(payment)) => {
                let order = OrderDraft {
                    total,
                    delivery,
                    payment,
                    address: None,
                };
                match delivery {
                    DeliveryMethod::Pickup => S::Confirmation { order },
                    DeliveryMethod::Delivery => S::AddressOption { order },
                }
            }
            (S::AddressOption { order }, E::EnterAddressManually) => S::EnterAddress { order },
            (S::AddressOption { order }, E::ShareLocation) => S::ShareLocation { order },
            (S::EnterAddress { order }, E::AddressText(text)) => {
                let text = text.trim().to_string();
                if text.is_empty() {
                    return Err(InvalidTransition);
                }
                S::Confirmation {
                    order: OrderDraft {
                        address: Some(Address::Text(text)),
                        ..order
                    },
                }
            }
            (
                S::ShareLocation { order },
                E::Location {
                    latitude,
                    longitude,
                },
            ) => S::Confirmation {
                order: OrderDraft {
                    address: Some(Address::Location {
                        latitude,
                        longitude,
                    }),
                    ..order
                },
            },
            (S::Confirmation { order }, E::Confirm) => match order.payment {
                PaymentMethod::Online => S::AwaitingPayment { order },
                PaymentMethod::Cash => return Ok(Transition::OrderPlaced(order)),
            },
            _ => return Err(InvalidTransition),
        };

        Ok(Transition::Next(next))
    }
}

/// Why a name/description/price was rejected
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputError {
    Empty,
    TooLong { max_chars: usize },
    NotAPositiveNumber,
    TooLarge { max: i64 },
}

fn validate_text(input: &str, max_chars: usize) -> Result<String, InputError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(InputError::Empty);
    }

    if trimmed.chars().count() > max_chars {
        return Err(InputError::TooLong { max_chars });
    }

    Ok(trimmed.to_string())
}

pub fn validate_category_name(name: &str) -> Result<String, InputError> {
    validate_text(name, MAX_CATEGORY_NAME_CHARS)
}

pub fn validate_product_name(name: &str) -> Result<String, InputError> {
    validate_text(name, MAX_PRODUCT_NAME_CHARS)
}

pub fn validate_description(description: &str) -> Result<String, InputError> {
    validate_text(description, MAX_DESCRIPTION_CHARS)
}

/// Prices are whole roubles in `1..=MAX_PRICE`
pub fn validate_price(price: &str) -> Result<i64, InputError> {
    let price = price.trim();
    match price.parse::<i64>() {
        Ok(value) if value > MAX_PRICE => Err(InputError::TooLarge { max: MAX_PRICE }),
        Ok(value) if value > 0 => Ok(value),
        // Digits beyond i64 are still a price, just far too large
        Err(_) if !price.is_empty() && price.bytes().all(|b| b.is_ascii_digit()) => {
            Err(InputError::TooLarge { max: MAX_PRICE })
        }
        _ => Err(InputError::NotAPositiveNumber),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_names_count_chars_not_bytes() {
        // 15 Cyrillic letters are 30 bytes but still a valid name
        assert!(validate_category_name("ПиццаПиццаПицца").is_ok());
        assert_eq!(
            validate_category_name("ПиццаПиццаПиццаП"),
            Err(InputError::TooLong { max_chars: 15 })
        );
        assert_eq!(validate_product_name("   "), Err(InputError::Empty));
        assert_eq!(validate_product_name("  Margherita "), Ok("Margherita".to_string()));
    }

    #[test]
    fn test_validate_price() {
        assert_eq!(validate_price("350"), Ok(350));
        assert_eq!(validate_price(" 99 "), Ok(99));
        assert_eq!(validate_price("0"), Err(InputError::NotAPositiveNumber));
        assert_eq!(validate_price("-5"), Err(InputError::NotAPositiveNumber));
        assert_eq!(validate_price("12.5"), Err(InputError::NotAPositiveNumber));
        assert_eq!(validate_price("1000000"), Ok(MAX_PRICE));
    }

    #[test]
    fn test_validate_price_rejects_huge_values() {
        let too_large = Err(InputError::TooLarge { max: MAX_PRICE });
        assert_eq!(validate_price("1000001"), too_large);
        assert_eq!(validate_price("9000000000000000000"), too_large);
        assert_eq!(validate_price("99999999999999999999999"), too_large);
    }

    #[test]
    fn test_description_limit() {
        assert!(validate_description(&"a".repeat(100)).is_ok());
        assert!(validate_description(&"a".repeat(101)).is_err());
    }

    #[test]
    fn test_invalid_event_keeps_nothing() {
        let step = ShopStep::DeliveryMethod { total: 700 };
        assert_eq!(step.advance(CheckoutEvent::Confirm), Err(InvalidTransition));
    }

    #[test]
    fn test_checkout_steps_carry_the_cart_total() {
        let browsing = ShopStep::Browsing {
            category_id: 1,
            products: Vec::new(),
            page: 0,
        };
        assert!(!browsing.is_checkout());
        assert!(!browsing.is_stale(1_000));

        let review = ShopStep::CartReview { total: 700 };
        assert!(review.is_checkout());
        assert!(!review.is_stale(700));
        assert!(review.is_stale(1_050));

        let confirmation = ShopStep::Confirmation {
            order: OrderDraft {
                total: 700,
                delivery: DeliveryMethod::Pickup,
                payment: PaymentMethod::Online,
                address: None,
            },
        };
        assert_eq!(confirmation.cart_total(), Some(700));
        // An item added after the total was shown
        assert!(confirmation.is_stale(1_050));
        // The cart was emptied elsewhere
        assert!(confirmation.is_stale(0));
    }

    #[test]
    fn test_amount_minor_units() {
        let order = OrderDraft {
            total: 700,
            delivery: DeliveryMethod::Pickup,
            payment: PaymentMethod::Online,
            address: None,
        };
        assert_eq!(order.amount_minor_units(), Ok(70_000));

        let huge = OrderDraft {
            total: 100_000_000_000_000_000,
            ..order
        };
        assert_eq!(huge.amount_minor_units(), Err(ShopError::AmountOverflow));
    }
}
