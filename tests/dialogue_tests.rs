use anyhow::Result;
use std::sync::Arc;

use pizzeria_bot::cache::MemoryCache;
use pizzeria_bot::catalog::Catalog;
use pizzeria_bot::db::{cart_total, NewProduct, Product};
use pizzeria_bot::store::MemoryStore;
use pizzeria_bot::dialogue::{
    Address, CheckoutEvent, DeliveryMethod, InvalidTransition, OrderDraft, PaymentMethod,
    ShopStep, State, Transition,
};

fn next(step: ShopStep, event: CheckoutEvent) -> ShopStep {
    match step.advance(event) {
        Ok(Transition::Next(step)) => step,
        other => panic!("Expected a next step, got {other:?}"),
    }
}

fn order(delivery: DeliveryMethod, payment: PaymentMethod) -> OrderDraft {
    OrderDraft {
        total: 700,
        delivery,
        payment,
        address: None,
    }
}

/// Pickup orders go straight from the payment choice to the confirmation
#[test]
fn test_pickup_skips_address() {
    let step = next(ShopStep::CartReview { total: 700 }, CheckoutEvent::GoToPay);
    assert_eq!(step, ShopStep::DeliveryMethod { total: 700 });

    let step = next(step, CheckoutEvent::ChooseDelivery(DeliveryMethod::Pickup));
    let step = next(step, CheckoutEvent::ChoosePayment(PaymentMethod::Cash));

    assert_eq!(
        step,
        ShopStep::Confirmation {
            order: order(DeliveryMethod::Pickup, PaymentMethod::Cash),
        }
    );
}

#[test]
fn test_delivery_collects_text_address() {
    let step = next(
        ShopStep::PaymentMethod {
            total: 700,
            delivery: DeliveryMethod::Delivery,
        },
        CheckoutEvent::ChoosePayment(PaymentMethod::Online),
    );
    assert!(matches!(step, ShopStep::AddressOption { .. }));

    // Confirmation is unreachable before an address is given
    assert_eq!(step.clone().advance(CheckoutEvent::Confirm), Err(InvalidTransition));

    let step = next(step, CheckoutEvent::EnterAddressManually);
    let step = next(step, CheckoutEvent::AddressText("  Lenina 1, apt 5 ".to_string()));

    match step {
        ShopStep::Confirmation { order } => {
            assert_eq!(order.address, Some(Address::Text("Lenina 1, apt 5".to_string())));
            assert_eq!(order.payment, PaymentMethod::Online);
        }
        other => panic!("Unexpected step: {other:?}"),
    }
}

#[test]
fn test_delivery_collects_location() {
    let step = ShopStep::AddressOption {
        order: order(DeliveryMethod::Delivery, PaymentMethod::Cash),
    };
    let step = next(step, CheckoutEvent::ShareLocation);
    assert!(matches!(step, ShopStep::ShareLocation { .. }));

    // Typed text is not accepted while a location is expected
    assert_eq!(
        step.clone().advance(CheckoutEvent::AddressText("Lenina 1".to_string())),
        Err(InvalidTransition)
    );

    let step = next(
        step,
        CheckoutEvent::Location {
            latitude: 55.751244,
            longitude: 37.618423,
        },
    );
    match step {
        ShopStep::Confirmation { order } => {
            let address = order.address.expect("address should be set");
            assert_eq!(address.to_string(), "55.751244, 37.618423");
        }
        other => panic!("Unexpected step: {other:?}"),
    }
}

#[test]
fn test_empty_address_is_rejected() {
    let step = ShopStep::EnterAddress {
        order: order(DeliveryMethod::Delivery, PaymentMethod::Cash),
    };
    assert_eq!(
        step.advance(CheckoutEvent::AddressText("   ".to_string())),
        Err(InvalidTransition)
    );
}

#[test]
fn test_confirm_cash_places_order() {
    let draft = order(DeliveryMethod::Pickup, PaymentMethod::Cash);
    let result = ShopStep::Confirmation {
        order: draft.clone(),
    }
    .advance(CheckoutEvent::Confirm);

    assert_eq!(result, Ok(Transition::OrderPlaced(draft)));
}

#[test]
fn test_confirm_online_awaits_payment() {
    let draft = order(DeliveryMethod::Pickup, PaymentMethod::Online);
    let step = next(
        ShopStep::Confirmation {
            order: draft.clone(),
        },
        CheckoutEvent::Confirm,
    );

    assert_eq!(step, ShopStep::AwaitingPayment { order: draft });
}

#[test]
fn test_out_of_order_events_are_rejected() {
    let cases = vec![
        (ShopStep::CartReview { total: 700 }, CheckoutEvent::Confirm),
        (
            ShopStep::DeliveryMethod { total: 700 },
            CheckoutEvent::ChoosePayment(PaymentMethod::Cash),
        ),
        (
            ShopStep::Browsing {
                category_id: 1,
                products: Vec::new(),
                page: 0,
            },
            CheckoutEvent::GoToPay,
        ),
        (
            ShopStep::AwaitingPayment {
                order: order(DeliveryMethod::Pickup, PaymentMethod::Online),
            },
            CheckoutEvent::Confirm,
        ),
    ];

    for (step, event) in cases {
        assert_eq!(step.advance(event), Err(InvalidTransition));
    }
}

/// A checkout priced before another item was added no longer matches the cart
#[tokio::test]
async fn test_adding_to_cart_makes_checkout_stale() -> Result<()> {
    let catalog = Catalog::new(Arc::new(MemoryStore::new()), Arc::new(MemoryCache::new()));
    let user = catalog.ensure_user(930_001, "Anna", None).await?;
    let pizza = catalog.create_category("Pizza").await?;
    let margherita = catalog
        .create_product(&NewProduct {
            name: "Margherita".to_string(),
            description: "Tomato, mozzarella".to_string(),
            price: 350,
            category_id: pizza.id,
            photo_path: "images/margherita-missing.jpg".to_string(),
        })
        .await?;

    catalog.add_to_cart(user.id, margherita.id).await?;
    catalog.add_to_cart(user.id, margherita.id).await?;
    let total = cart_total(&catalog.cart(user.id).await?)?;

    let step = next(ShopStep::CartReview { total }, CheckoutEvent::GoToPay);
    let step = next(step, CheckoutEvent::ChooseDelivery(DeliveryMethod::Pickup));
    let step = next(step, CheckoutEvent::ChoosePayment(PaymentMethod::Online));
    assert!(!step.is_stale(cart_total(&catalog.cart(user.id).await?)?));

    catalog.add_to_cart(user.id, margherita.id).await?;
    let current = cart_total(&catalog.cart(user.id).await?)?;
    assert_eq!(current, 1_050);
    assert!(step.is_checkout());
    assert!(step.is_stale(current));

    Ok(())
}

/// Redis storage keeps states as JSON
#[test]
fn test_state_json_round_trip() -> Result<()> {
    let state = State::Shop(ShopStep::Browsing {
        category_id: 3,
        products: vec![Product {
            id: 7,
            name: "Margherita".to_string(),
            description: "Tomato, mozzarella".to_string(),
            price: 350,
            category_id: 3,
            photo_path: "images/AgAD.jpg".to_string(),
        }],
        page: 0,
    });

    let json = serde_json::to_string(&state)?;
    let restored: State = serde_json::from_str(&json)?;
    assert_eq!(restored, state);

    Ok(())
}
