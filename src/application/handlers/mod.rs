//! Application handlers.
//!
//! Handlers that orchestrate domain operations across ports.

pub mod billing;

pub use billing::{
    BillingHandlerRegistry, CheckoutCompletedHandler, InvoicePaymentFailedHandler,
    InvoicePaymentSucceededHandler, SubscriptionCanceledHandler, SubscriptionCreatedHandler,
    SubscriptionUpdatedHandler,
};
