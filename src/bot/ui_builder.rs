//! UI Builder module for creating keyboards and formatting messages

use teloxide::types::{
    ButtonRequest, InlineKeyboardButton, InlineKeyboardMarkup, KeyboardButton, KeyboardMarkup,
};

use crate::callbacks::{AdminAction, ShopAction};
use crate::db::{cart_total, CartItem, Category, Product};
use crate::dialogue::{DeliveryMethod, OrderDraft, PaymentMethod};
use crate::errors::ShopError;
use crate::localization::{t_args_lang, t_lang};

/// Products shown per page in the catalog view
pub const PRODUCTS_PER_PAGE: usize = 1;

/// Row lengths for `count` buttons: `sizes` in order, the last one repeating
pub fn row_sizes(count: usize, sizes: &[usize]) -> Vec<usize> {
    let mut rows = Vec::new();
    let mut remaining = count;
    let mut index = 0;

    while remaining > 0 {
        let size = sizes
            .get(index)
            .or_else(|| sizes.last())
            .copied()
            .unwrap_or(2)
            .max(1);
        let take = size.min(remaining);
        rows.push(take);
        remaining -= take;
        index += 1;
    }

    rows
}

/// One callback button per `(label, data)` pair laid out by [`row_sizes`]
pub fn inline_buttons(buttons: Vec<(String, String)>, sizes: &[usize]) -> InlineKeyboardMarkup {
    let mut buttons = buttons
        .into_iter()
        .map(|(label, data)| InlineKeyboardButton::callback(label, data));

    let rows = row_sizes(buttons.len(), sizes)
        .into_iter()
        .map(|size| buttons.by_ref().take(size).collect())
        .collect::<Vec<Vec<_>>>();

    InlineKeyboardMarkup::new(rows)
}

fn shop_button(label: String, action: ShopAction) -> (String, String) {
    (label, action.to_string())
}

fn admin_button(label: String, action: AdminAction) -> (String, String) {
    (label, action.to_string())
}

pub fn main_menu_keyboard(language_code: Option<&str>) -> InlineKeyboardMarkup {
    inline_buttons(
        vec![
            shop_button(t_lang("button-menu", language_code), ShopAction::Menu),
            shop_button(t_lang("button-cart", language_code), ShopAction::Cart),
            shop_button(t_lang("button-addresses", language_code), ShopAction::OurAddresses),
            shop_button(t_lang("button-about", language_code), ShopAction::AboutUs),
        ],
        &[2],
    )
}

pub fn back_to_main_keyboard(language_code: Option<&str>) -> InlineKeyboardMarkup {
    inline_buttons(
        vec![shop_button(t_lang("button-to-main", language_code), ShopAction::ToMain)],
        &[1],
    )
}

/// Categories as buttons whose payload is produced by `action`
pub fn categories_keyboard<A: ToString>(
    categories: &[Category],
    action: impl Fn(i64) -> A,
) -> InlineKeyboardMarkup {
    inline_buttons(
        categories
            .iter()
            .map(|category| (category.name.clone(), action(category.id).to_string()))
            .collect(),
        &[2],
    )
}

/// Category picker of the customer menu, with a way back to the main menu
pub fn menu_categories_keyboard(
    categories: &[Category],
    language_code: Option<&str>,
) -> InlineKeyboardMarkup {
    let mut buttons: Vec<(String, String)> = categories
        .iter()
        .map(|category| shop_button(category.name.clone(), ShopAction::Category(category.id)))
        .collect();
    buttons.push(shop_button(t_lang("button-to-main", language_code), ShopAction::ToMain));

    let mut sizes = row_sizes(categories.len(), &[2]);
    sizes.push(1);
    inline_buttons(buttons, &sizes)
}

/// Keyboard under a product photo: add-to-cart, navigation, back to main
pub fn products_pagination(
    products: &[Product],
    page: usize,
    language_code: Option<&str>,
) -> InlineKeyboardMarkup {
    let start = page * PRODUCTS_PER_PAGE;
    let end = (start + PRODUCTS_PER_PAGE).min(products.len());

    let mut rows: Vec<Vec<InlineKeyboardButton>> = products
        .get(start..end)
        .unwrap_or_default()
        .iter()
        .map(|product| {
            vec![InlineKeyboardButton::callback(
                t_lang("button-add-to-cart", language_code),
                ShopAction::AddToCart(product.id).to_string(),
            )]
        })
        .collect();

    let mut navigation = Vec::new();
    if page > 0 {
        navigation.push(InlineKeyboardButton::callback(
            t_lang("button-previous", language_code),
            ShopAction::Page(page - 1).to_string(),
        ));
    }
    if end < products.len() {
        navigation.push(InlineKeyboardButton::callback(
            t_lang("button-next", language_code),
            ShopAction::Page(page + 1).to_string(),
        ));
    }
    if !navigation.is_empty() {
        rows.push(navigation);
    }

    rows.push(vec![InlineKeyboardButton::callback(
        t_lang("button-to-main", language_code),
        ShopAction::ToMain.to_string(),
    )]);

    InlineKeyboardMarkup::new(rows)
}

pub fn cart_keyboard(language_code: Option<&str>) -> InlineKeyboardMarkup {
    inline_buttons(
        vec![
            shop_button(t_lang("button-go-to-pay", language_code), ShopAction::GoToPay),
            shop_button(t_lang("button-remove-item", language_code), ShopAction::ChooseRemove),
            shop_button(t_lang("button-cancel", language_code), ShopAction::ToMain),
        ],
        &[1],
    )
}

pub fn cart_remove_keyboard(items: &[CartItem], language_code: Option<&str>) -> InlineKeyboardMarkup {
    let mut buttons: Vec<(String, String)> = items
        .iter()
        .map(|item| {
            shop_button(
                format!("❌ {}", item.product_name),
                ShopAction::RemoveFromCart(item.product_id),
            )
        })
        .collect();
    buttons.push(shop_button(
        t_lang("button-cancel", language_code),
        ShopAction::BackToCart,
    ));

    inline_buttons(buttons, &[1])
}

pub fn delivery_method_keyboard(language_code: Option<&str>) -> InlineKeyboardMarkup {
    inline_buttons(
        vec![
            shop_button(
                t_lang("button-delivery", language_code),
                ShopAction::Delivery(DeliveryMethod::Delivery),
            ),
            shop_button(
                t_lang("button-pickup", language_code),
                ShopAction::Delivery(DeliveryMethod::Pickup),
            ),
            shop_button(t_lang("button-cancel", language_code), ShopAction::BackToCart),
        ],
        &[2, 1],
    )
}

pub fn payment_method_keyboard(
    delivery: DeliveryMethod,
    language_code: Option<&str>,
) -> InlineKeyboardMarkup {
    inline_buttons(
        vec![
            shop_button(
                payment_label(PaymentMethod::Online, delivery, language_code),
                ShopAction::Payment(PaymentMethod::Online),
            ),
            shop_button(
                payment_label(PaymentMethod::Cash, delivery, language_code),
                ShopAction::Payment(PaymentMethod::Cash),
            ),
            shop_button(t_lang("button-cancel", language_code), ShopAction::BackToCart),
        ],
        &[2, 1],
    )
}

pub fn address_options_keyboard(language_code: Option<&str>) -> InlineKeyboardMarkup {
    inline_buttons(
        vec![
            shop_button(t_lang("button-address-manual", language_code), ShopAction::AddressManual),
            shop_button(
                t_lang("button-address-location", language_code),
                ShopAction::AddressLocation,
            ),
            shop_button(t_lang("button-cancel", language_code), ShopAction::BackToCart),
        ],
        &[1],
    )
}

/// Lone "cancel" button leading back to the cart review
pub fn checkout_cancel_keyboard(language_code: Option<&str>) -> InlineKeyboardMarkup {
    inline_buttons(
        vec![shop_button(t_lang("button-cancel", language_code), ShopAction::BackToCart)],
        &[1],
    )
}

/// Reply keyboard asking Telegram to share the user's location
pub fn location_request_keyboard(language_code: Option<&str>) -> KeyboardMarkup {
    KeyboardMarkup::new(vec![
        vec![KeyboardButton::new(t_lang("button-send-location", language_code))
            .request(ButtonRequest::Location)],
        vec![KeyboardButton::new(t_lang("button-cancel", language_code))],
    ])
    .resize_keyboard()
    .one_time_keyboard()
}

pub fn confirm_order_keyboard(language_code: Option<&str>) -> InlineKeyboardMarkup {
    inline_buttons(
        vec![
            shop_button(t_lang("button-confirm-order", language_code), ShopAction::ConfirmOrder),
            shop_button(t_lang("button-cancel-order", language_code), ShopAction::CancelOrder),
        ],
        &[2],
    )
}

pub fn admin_home_keyboard(language_code: Option<&str>) -> InlineKeyboardMarkup {
    inline_buttons(
        vec![
            admin_button(t_lang("admin-button-category", language_code), AdminAction::CategorySection),
            admin_button(t_lang("admin-button-product", language_code), AdminAction::ProductSection),
        ],
        &[2],
    )
}

pub fn admin_category_section_keyboard(language_code: Option<&str>) -> InlineKeyboardMarkup {
    inline_buttons(
        vec![
            admin_button(t_lang("admin-button-list-categories", language_code), AdminAction::ListCategories),
            admin_button(t_lang("admin-button-new-category", language_code), AdminAction::NewCategory),
            admin_button(t_lang("admin-button-change-category", language_code), AdminAction::ChangeCategory),
            admin_button(t_lang("admin-button-delete-category", language_code), AdminAction::DeleteCategory),
            admin_button(t_lang("button-cancel", language_code), AdminAction::Home),
        ],
        &[2],
    )
}

pub fn admin_product_section_keyboard(language_code: Option<&str>) -> InlineKeyboardMarkup {
    inline_buttons(
        vec![
            admin_button(t_lang("admin-button-list-products", language_code), AdminAction::ListProducts),
            admin_button(t_lang("admin-button-new-product", language_code), AdminAction::NewProduct),
            admin_button(t_lang("admin-button-delete-product", language_code), AdminAction::DeleteProduct),
            admin_button(t_lang("button-cancel", language_code), AdminAction::Home),
        ],
        &[2],
    )
}

pub fn admin_back_keyboard(language_code: Option<&str>) -> InlineKeyboardMarkup {
    inline_buttons(
        vec![admin_button(t_lang("button-to-main", language_code), AdminAction::Home)],
        &[1],
    )
}

/// Products as buttons whose payload is produced by `action`
pub fn products_keyboard(
    products: &[Product],
    action: impl Fn(i64) -> AdminAction,
) -> InlineKeyboardMarkup {
    inline_buttons(
        products
            .iter()
            .map(|product| (product.name.clone(), action(product.id).to_string()))
            .collect(),
        &[2],
    )
}

// Text formatting

pub fn format_product_caption(product: &Product, language_code: Option<&str>) -> String {
    t_args_lang(
        "product-caption",
        &[
            ("name", &product.name),
            ("description", &product.description),
            ("price", &product.price.to_string()),
        ],
        language_code,
    )
}

/// Cart summary with per-item sums and the total to pay
pub fn format_cart(items: &[CartItem], language_code: Option<&str>) -> Result<String, ShopError> {
    let mut text = t_lang("cart-title", language_code);
    text.push('\n');

    for item in items {
        text.push_str(&t_args_lang(
            "cart-line",
            &[
                ("name", &item.product_name),
                ("quantity", &item.quantity.to_string()),
                ("sum", &item.line_total()?.to_string()),
            ],
            language_code,
        ));
        text.push_str("\n\n");
    }

    text.push_str(&t_args_lang(
        "cart-total",
        &[("total", &cart_total(items)?.to_string())],
        language_code,
    ));
    Ok(text)
}

pub fn delivery_label(delivery: DeliveryMethod, language_code: Option<&str>) -> String {
    match delivery {
        DeliveryMethod::Delivery => t_lang("button-delivery", language_code),
        DeliveryMethod::Pickup => t_lang("button-pickup", language_code),
    }
}

/// Cash means "to the courier" for delivery and "at the counter" for pickup
pub fn payment_label(
    payment: PaymentMethod,
    delivery: DeliveryMethod,
    language_code: Option<&str>,
) -> String {
    match (payment, delivery) {
        (PaymentMethod::Online, _) => t_lang("button-pay-online", language_code),
        (PaymentMethod::Cash, DeliveryMethod::Delivery) => {
            t_lang("button-pay-cash-courier", language_code)
        }
        (PaymentMethod::Cash, DeliveryMethod::Pickup) => {
            t_lang("button-pay-cash-pizzeria", language_code)
        }
    }
}

pub fn format_order_confirmation(order: &OrderDraft, language_code: Option<&str>) -> String {
    let address = match &order.address {
        Some(address) => address.to_string(),
        None => t_lang("order-no-address", language_code),
    };

    t_args_lang(
        "order-confirmation",
        &[
            ("total", &order.total.to_string()),
            ("delivery", &delivery_label(order.delivery, language_code)),
            (
                "payment",
                &payment_label(order.payment, order.delivery, language_code),
            ),
            ("address", &address),
        ],
        language_code,
    )
}

pub fn format_category_list(categories: &[Category], language_code: Option<&str>) -> String {
    let lines = categories
        .iter()
        .enumerate()
        .map(|(i, category)| format!("{}. {}", i + 1, category.name))
        .collect::<Vec<_>>()
        .join("\n");

    format!("{}\n{}", t_lang("admin-category-list", language_code), lines)
}

pub fn format_product_list(products: &[Product], language_code: Option<&str>) -> String {
    let lines = products
        .iter()
        .map(|product| {
            t_args_lang(
                "admin-product-line",
                &[
                    ("name", &product.name),
                    ("description", &product.description),
                    ("price", &product.price.to_string()),
                ],
                language_code,
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!("{}\n{}", t_lang("admin-product-list", language_code), lines)
}
