//! Billing webhook handlers.
//!
//! Each handler applies one provider event inside the transaction the
//! processor opened. Handlers claim the event through the ledger before
//! mutating anything, and persist the organization once at the end.

mod checkout_completed;
mod invoice_payment_failed;
mod invoice_payment_succeeded;
mod lifecycle;
mod registry;
mod subscription_canceled;
mod subscription_created;
mod subscription_updated;

#[cfg(test)]
mod test_support;

pub use checkout_completed::CheckoutCompletedHandler;
pub use invoice_payment_failed::InvoicePaymentFailedHandler;
pub use invoice_payment_succeeded::InvoicePaymentSucceededHandler;
pub use registry::BillingHandlerRegistry;
pub use subscription_canceled::SubscriptionCanceledHandler;
pub use subscription_created::SubscriptionCreatedHandler;
pub use subscription_updated::SubscriptionUpdatedHandler;
