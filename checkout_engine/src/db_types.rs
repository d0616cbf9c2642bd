use std::{fmt::Display, str::FromStr};

use checkout_common::Krw;
use chrono::{DateTime, Utc};
use log::error;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;
use uuid::Uuid;

//--------------------------------------     OrderNumber     ---------------------------------------------------------
/// The external-facing identifier of an order. An opaque token that leaks nothing about order volume.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct OrderNumber(pub String);

impl OrderNumber {
    /// Generates a fresh order number. Collisions are prevented by the unique column constraint.
    pub fn random() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for OrderNumber {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderNumber {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for OrderNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

//--------------------------------------   OrderStatusType   ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum OrderStatusType {
    /// The order has been created and no payment has been captured yet.
    Ready,
    /// The payment has been captured and stock has been reserved.
    Paid,
    /// A cancellation is in flight. Blocks concurrent confirmations and second cancellations.
    CancelRequested,
    /// The order has been cancelled. Terminal.
    Cancelled,
    /// The provider captured the payment but the charge could not be reversed after local settlement failed.
    /// Terminal; requires a manual refund by an operator.
    RefundFailed,
}

impl Display for OrderStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatusType::Ready => write!(f, "Ready"),
            OrderStatusType::Paid => write!(f, "Paid"),
            OrderStatusType::CancelRequested => write!(f, "CancelRequested"),
            OrderStatusType::Cancelled => write!(f, "Cancelled"),
            OrderStatusType::RefundFailed => write!(f, "RefundFailed"),
        }
    }
}

impl From<String> for OrderStatusType {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid order status: {value}. But this conversion cannot fail. Defaulting to Ready");
            OrderStatusType::Ready
        })
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid conversion: {0}")]
pub struct ConversionError(String);

impl FromStr for OrderStatusType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Ready" => Ok(Self::Ready),
            "Paid" => Ok(Self::Paid),
            "CancelRequested" => Ok(Self::CancelRequested),
            "Cancelled" => Ok(Self::Cancelled),
            "RefundFailed" => Ok(Self::RefundFailed),
            s => Err(ConversionError(format!("Invalid order status: {s}"))),
        }
    }
}

//--------------------------------------    PaymentMethod    ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum PaymentMethod {
    Card,
    VirtualAccount,
    Transfer,
    EasyPay,
}

impl PaymentMethod {
    /// Maps the free-form method label returned by the payment provider onto our own enum. The provider
    /// reports methods in its own locale, so both the localised and the token forms are accepted.
    pub fn from_gateway(method: &str) -> Self {
        match method.trim() {
            "카드" | "CARD" | "Card" => Self::Card,
            "가상계좌" | "VIRTUAL_ACCOUNT" => Self::VirtualAccount,
            "계좌이체" | "TRANSFER" => Self::Transfer,
            "간편결제" | "EASY_PAY" => Self::EasyPay,
            other => {
                error!("Unknown payment method from gateway: {other}. Defaulting to Card");
                Self::Card
            },
        }
    }
}

impl Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentMethod::Card => write!(f, "Card"),
            PaymentMethod::VirtualAccount => write!(f, "VirtualAccount"),
            PaymentMethod::Transfer => write!(f, "Transfer"),
            PaymentMethod::EasyPay => write!(f, "EasyPay"),
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Card" => Ok(Self::Card),
            "VirtualAccount" => Ok(Self::VirtualAccount),
            "Transfer" => Ok(Self::Transfer),
            "EasyPay" => Ok(Self::EasyPay),
            s => Err(ConversionError(format!("Invalid payment method: {s}"))),
        }
    }
}

//--------------------------------------     OrderSource     ---------------------------------------------------------
/// How the order was assembled. Cart-sourced orders remember their cart lines so that settlement can clear them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum OrderSource {
    Direct,
    Cart,
}

impl Display for OrderSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSource::Direct => write!(f, "Direct"),
            OrderSource::Cart => write!(f, "Cart"),
        }
    }
}

//--------------------------------------        Order        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub order_number: OrderNumber,
    pub user_id: i64,
    /// Human-readable order title, derived from the first product name at creation time.
    pub label: String,
    /// The total charged for the order, frozen at creation time. Payment confirmation validates the charged
    /// amount against this value, never against current product prices.
    pub final_price: Krw,
    pub status: OrderStatusType,
    pub payment_method: Option<PaymentMethod>,
    pub payment_key: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub source: OrderSource,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------      NewOrder       ---------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_number: OrderNumber,
    pub user_id: i64,
    pub label: String,
    pub final_price: Krw,
    pub source: OrderSource,
    pub lines: Vec<NewOrderLine>,
    /// The cart lines this order was assembled from. Empty for direct orders.
    pub cart_line_ids: Vec<i64>,
}

#[derive(Debug, Clone)]
pub struct NewOrderLine {
    pub product_id: i64,
    pub quantity: i64,
    /// Unit price snapshot. Later price changes to the product must not change historical orders.
    pub unit_price: Krw,
}

//--------------------------------------      OrderLine      ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct OrderLine {
    pub id: i64,
    pub order_id: i64,
    pub product_id: i64,
    pub quantity: i64,
    pub unit_price: Krw,
}

//--------------------------------------  PaymentSettlement  ---------------------------------------------------------
/// The payment metadata recorded against an order when the provider confirms the charge.
#[derive(Debug, Clone)]
pub struct PaymentSettlement {
    pub payment_key: String,
    pub method: PaymentMethod,
    pub approved_at: DateTime<Utc>,
}

//--------------------------------------       Product       ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub price: Krw,
    pub stock: i64,
    pub featured: bool,
    pub featured_rank: Option<i64>,
    /// Stored file name of the main product image. Presentation URLs are derived at read time.
    pub main_image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub price: Krw,
    pub stock: i64,
    pub main_image: Option<String>,
}

//--------------------------------------      CartLine       ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CartLine {
    pub id: i64,
    pub user_id: i64,
    pub product_id: i64,
    pub quantity: i64,
    pub created_at: DateTime<Utc>,
}

/// A cart line joined with the product it refers to, as used when assembling a cart-sourced order.
#[derive(Debug, Clone, FromRow)]
pub struct CartLineProduct {
    pub cart_line_id: i64,
    pub product_id: i64,
    pub quantity: i64,
    pub name: String,
    pub price: Krw,
    pub stock: i64,
}
