//! Callback payloads carried by inline buttons.
//!
//! Buttons are built from these enums (`to_string`) and incoming callback
//! data is parsed back (`parse`). Some payloads embed an entity id after a
//! `_` or `:` delimiter.

use std::fmt;
use std::str::FromStr;

use crate::dialogue::{CheckoutEvent, DeliveryMethod, PaymentMethod};

/// Payload that matches no known button
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCallback(pub String);

impl fmt::Display for UnknownCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unknown callback payload: {}", self.0)
    }
}

impl std::error::Error for UnknownCallback {}

fn id_after<T: FromStr>(data: &str, prefix: &str) -> Option<T> {
    data.strip_prefix(prefix)?.parse().ok()
}

/// Buttons of the customer-facing flows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShopAction {
    ToMain,
    Menu,
    Cart,
    OurAddresses,
    AboutUs,
    Category(i64),
    AddToCart(i64),
    Page(usize),
    GoToPay,
    ChooseRemove,
    RemoveFromCart(i64),
    BackToCart,
    Delivery(DeliveryMethod),
    Payment(PaymentMethod),
    AddressManual,
    AddressLocation,
    ConfirmOrder,
    CancelOrder,
}

impl fmt::Display for ShopAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShopAction::ToMain => f.write_str("to_main"),
            ShopAction::Menu => f.write_str("menu"),
            ShopAction::Cart => f.write_str("cart"),
            ShopAction::OurAddresses => f.write_str("my_address"),
            ShopAction::AboutUs => f.write_str("about_us"),
            ShopAction::Category(id) => write!(f, "category_{id}"),
            ShopAction::AddToCart(id) => write!(f, "product_{id}"),
            ShopAction::Page(page) => write!(f, "page:{page}"),
            ShopAction::GoToPay => f.write_str("go_to_pay"),
            ShopAction::ChooseRemove => f.write_str("choose_delete"),
            ShopAction::RemoveFromCart(id) => write!(f, "cart_remove:{id}"),
            ShopAction::BackToCart => f.write_str("cancel_delete"),
            ShopAction::Delivery(DeliveryMethod::Delivery) => f.write_str("delivery"),
            ShopAction::Delivery(DeliveryMethod::Pickup) => f.write_str("pickup"),
            ShopAction::Payment(PaymentMethod::Online) => f.write_str("pay_online"),
            ShopAction::Payment(PaymentMethod::Cash) => f.write_str("pay_cash"),
            ShopAction::AddressManual => f.write_str("address_manual"),
            ShopAction::AddressLocation => f.write_str("address_location"),
            ShopAction::ConfirmOrder => f.write_str("confirm_order"),
            ShopAction::CancelOrder => f.write_str("cancel_order"),
        }
    }
}

impl ShopAction {
    /// The checkout event a button press stands for, if it is a checkout button
    pub fn checkout_event(self) -> Option<CheckoutEvent> {
        match self {
            ShopAction::GoToPay => Some(CheckoutEvent::GoToPay),
            ShopAction::Delivery(method) => Some(CheckoutEvent::ChooseDelivery(method)),
            ShopAction::Payment(method) => Some(CheckoutEvent::ChoosePayment(method)),
            ShopAction::AddressManual => Some(CheckoutEvent::EnterAddressManually),
            ShopAction::AddressLocation => Some(CheckoutEvent::ShareLocation),
            ShopAction::ConfirmOrder => Some(CheckoutEvent::Confirm),
            _ => None,
        }
    }
}

impl FromStr for ShopAction {
    type Err = UnknownCallback;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let action = match data {
            "to_main" => ShopAction::ToMain,
            "menu" => ShopAction::Menu,
            "cart" => ShopAction::Cart,
            "my_address" => ShopAction::OurAddresses,
            "about_us" => ShopAction::AboutUs,
            "go_to_pay" => ShopAction::GoToPay,
            "choose_delete" => ShopAction::ChooseRemove,
            "cancel_delete" => ShopAction::BackToCart,
            "delivery" => ShopAction::Delivery(DeliveryMethod::Delivery),
            "pickup" => ShopAction::Delivery(DeliveryMethod::Pickup),
            "pay_online" => ShopAction::Payment(PaymentMethod::Online),
            "pay_cash" => ShopAction::Payment(PaymentMethod::Cash),
            "address_manual" => ShopAction::AddressManual,
            "address_location" => ShopAction::AddressLocation,
            "confirm_order" => ShopAction::ConfirmOrder,
            "cancel_order" => ShopAction::CancelOrder,
            _ => {
                return id_after(data, "category_")
                    .map(ShopAction::Category)
                    .or_else(|| id_after(data, "product_").map(ShopAction::AddToCart))
                    .or_else(|| id_after(data, "page:").map(ShopAction::Page))
                    .or_else(|| id_after(data, "cart_remove:").map(ShopAction::RemoveFromCart))
                    .ok_or_else(|| UnknownCallback(data.to_string()));
            }
        };
        Ok(action)
    }
}

/// Buttons of the administrator flows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminAction {
    Home,
    CategorySection,
    ProductSection,
    ListCategories,
    NewCategory,
    ChangeCategory,
    ChangeCategoryPick(i64),
    DeleteCategory,
    DeleteCategoryPick(i64),
    ListProducts,
    ListProductsOf(i64),
    NewProduct,
    NewProductCategory(i64),
    DeleteProduct,
    DeleteProductCategory(i64),
    DeleteProductPick(i64),
}

impl fmt::Display for AdminAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdminAction::Home => f.write_str("admin_main"),
            AdminAction::CategorySection => f.write_str("admin_category"),
            AdminAction::ProductSection => f.write_str("admin_product"),
            AdminAction::ListCategories => f.write_str("list_category"),
            AdminAction::NewCategory => f.write_str("new_category"),
            AdminAction::ChangeCategory => f.write_str("change_category"),
            AdminAction::ChangeCategoryPick(id) => write!(f, "change_category_{id}"),
            AdminAction::DeleteCategory => f.write_str("delete_category"),
            AdminAction::DeleteCategoryPick(id) => write!(f, "delete_category_{id}"),
            AdminAction::ListProducts => f.write_str("list_product"),
            AdminAction::ListProductsOf(id) => write!(f, "items_category_{id}"),
            AdminAction::NewProduct => f.write_str("new_product"),
            AdminAction::NewProductCategory(id) => write!(f, "choose_category:{id}"),
            AdminAction::DeleteProduct => f.write_str("delete_product"),
            AdminAction::DeleteProductCategory(id) => write!(f, "choose_category_{id}"),
            AdminAction::DeleteProductPick(id) => write!(f, "delete_product_{id}"),
        }
    }
}

impl FromStr for AdminAction {
    type Err = UnknownCallback;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let action = match data {
            "admin_main" => AdminAction::Home,
            "admin_category" => AdminAction::CategorySection,
            "admin_product" => AdminAction::ProductSection,
            "list_category" => AdminAction::ListCategories,
            "new_category" => AdminAction::NewCategory,
            "change_category" => AdminAction::ChangeCategory,
            "delete_category" => AdminAction::DeleteCategory,
            "list_product" => AdminAction::ListProducts,
            "new_product" => AdminAction::NewProduct,
            "delete_product" => AdminAction::DeleteProduct,
            _ => {
                return id_after(data, "change_category_")
                    .map(AdminAction::ChangeCategoryPick)
                    .or_else(|| id_after(data, "delete_category_").map(AdminAction::DeleteCategoryPick))
                    .or_else(|| id_after(data, "items_category_").map(AdminAction::ListProductsOf))
                    .or_else(|| id_after(data, "choose_category:").map(AdminAction::NewProductCategory))
                    .or_else(|| {
                        id_after(data, "choose_category_").map(AdminAction::DeleteProductCategory)
                    })
                    .or_else(|| id_after(data, "delete_product_").map(AdminAction::DeleteProductPick))
                    .ok_or_else(|| UnknownCallback(data.to_string()));
            }
        };
        Ok(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_shop_payloads_with_ids() {
        assert_eq!("category_7".parse(), Ok(ShopAction::Category(7)));
        assert_eq!("product_3".parse(), Ok(ShopAction::AddToCart(3)));
        assert_eq!("page:2".parse(), Ok(ShopAction::Page(2)));
        assert_eq!("cart_remove:11".parse(), Ok(ShopAction::RemoveFromCart(11)));
        assert_eq!(
            "pickup".parse(),
            Ok(ShopAction::Delivery(DeliveryMethod::Pickup))
        );
    }

    #[test]
    fn test_parse_rejects_malformed_ids() {
        assert!("category_".parse::<ShopAction>().is_err());
        assert!("page:-1".parse::<ShopAction>().is_err());
        assert!("product_abc".parse::<ShopAction>().is_err());
        assert_eq!(
            "nonsense".parse::<ShopAction>(),
            Err(UnknownCallback("nonsense".to_string()))
        );
    }

    #[test]
    fn test_admin_payloads_with_shared_prefixes() {
        assert_eq!("change_category".parse(), Ok(AdminAction::ChangeCategory));
        assert_eq!("change_category_4".parse(), Ok(AdminAction::ChangeCategoryPick(4)));
        assert_eq!("choose_category:5".parse(), Ok(AdminAction::NewProductCategory(5)));
        assert_eq!("choose_category_5".parse(), Ok(AdminAction::DeleteProductCategory(5)));
        assert_eq!("delete_product".parse(), Ok(AdminAction::DeleteProduct));
        assert_eq!("delete_product_9".parse(), Ok(AdminAction::DeleteProductPick(9)));
    }

    #[test]
    fn test_shop_and_admin_payloads_do_not_overlap() {
        // Admin "delete_product_9" must not be mistaken for a shop button
        assert!("delete_product_9".parse::<ShopAction>().is_err());
        assert!("category_7".parse::<AdminAction>().is_err());
        assert_eq!(AdminAction::DeleteProductPick(9).to_string(), "delete_product_9");
        assert_eq!(ShopAction::RemoveFromCart(9).to_string(), "cart_remove:9");
    }

    #[test]
    fn test_checkout_events() {
        assert_eq!(ShopAction::GoToPay.checkout_event(), Some(CheckoutEvent::GoToPay));
        assert_eq!(
            ShopAction::Payment(PaymentMethod::Cash).checkout_event(),
            Some(CheckoutEvent::ChoosePayment(PaymentMethod::Cash))
        );
        assert_eq!(ShopAction::Cart.checkout_event(), None);
        assert_eq!(ShopAction::CancelOrder.checkout_event(), None);
    }
}
