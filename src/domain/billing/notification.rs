//! Billing notifications.
//!
//! Handlers return the notifications an event warrants; they are sent only
//! after the transaction commits, and a delivery failure never affects the
//! committed state.

use std::sync::Arc;
use tracing::{debug, warn};

use super::purgatory::PurgatoryReason;
use crate::domain::foundation::{Credits, OrganizationId};
use crate::ports::{AdminDirectory, Notifier};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationKind {
    TopUpReceived { credits: Credits, new_balance: Credits },
    Suspended { reason: PurgatoryReason },
    PaymentWarning { attempt_count: u32 },
    Reactivated,
}

/// A notification addressed to an organization's administrators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillingNotification {
    pub organization_id: OrganizationId,
    pub organization_name: String,
    pub kind: NotificationKind,
}

impl BillingNotification {
    pub fn new(
        organization_id: OrganizationId,
        organization_name: impl Into<String>,
        kind: NotificationKind,
    ) -> Self {
        Self {
            organization_id,
            organization_name: organization_name.into(),
            kind,
        }
    }

    pub fn subject(&self) -> String {
        match &self.kind {
            NotificationKind::TopUpReceived { .. } => {
                format!("Credits added to {}", self.organization_name)
            }
            NotificationKind::Suspended { .. } => {
                format!("{} has been suspended", self.organization_name)
            }
            NotificationKind::PaymentWarning { .. } => {
                format!("Payment failed for {}", self.organization_name)
            }
            NotificationKind::Reactivated => {
                format!("{} is active again", self.organization_name)
            }
        }
    }

    pub fn body(&self) -> String {
        match &self.kind {
            NotificationKind::TopUpReceived {
                credits,
                new_balance,
            } => format!(
                "Your purchase of {} credits was received. The new balance is {} credits.",
                credits, new_balance
            ),
            NotificationKind::Suspended { reason } => match reason {
                PurgatoryReason::PaymentFailed => "Repeated payment failures have suspended your \
                     organization. Update your payment method to restore access."
                    .to_string(),
                PurgatoryReason::SubscriptionCanceled => "Your subscription was canceled and your \
                     organization has been suspended. Subscribe again to restore access."
                    .to_string(),
            },
            NotificationKind::PaymentWarning { attempt_count } => format!(
                "Payment attempt {} failed. Please check your payment method to avoid suspension.",
                attempt_count
            ),
            NotificationKind::Reactivated => {
                "Your payment was received and your organization has been reactivated.".to_string()
            }
        }
    }
}

/// Delivers notifications to every administrator of the organization.
#[derive(Clone)]
pub struct NotificationDispatcher {
    directory: Arc<dyn AdminDirectory>,
    notifier: Arc<dyn Notifier>,
}

impl NotificationDispatcher {
    pub fn new(directory: Arc<dyn AdminDirectory>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            directory,
            notifier,
        }
    }

    /// Sends each notification, logging and swallowing failures.
    pub async fn dispatch(&self, notifications: &[BillingNotification]) {
        for notification in notifications {
            let recipients = match self
                .directory
                .list_admin_emails(notification.organization_id)
                .await
            {
                Ok(recipients) => recipients,
                Err(e) => {
                    warn!(
                        organization_id = %notification.organization_id,
                        error = %e,
                        "Failed to resolve notification recipients"
                    );
                    continue;
                }
            };

            if recipients.is_empty() {
                debug!(
                    organization_id = %notification.organization_id,
                    "No administrators to notify"
                );
                continue;
            }

            let subject = notification.subject();
            let body = notification.body();
            for recipient in &recipients {
                if let Err(e) = self
                    .notifier
                    .send_notification_email(recipient, &subject, &body)
                    .await
                {
                    warn!(
                        organization_id = %notification.organization_id,
                        recipient = %recipient,
                        error = %e,
                        "Failed to send billing notification"
                    );
                }
            }
        }
    }
}
