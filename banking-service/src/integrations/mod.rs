//! Narrow interfaces to the systems this service depends on, each with an HTTP
//! implementation and an in-process one for development and tests.

pub mod approvals;
pub mod audit;
pub mod bank_channel;
pub mod credentials;
pub mod invoices;
pub mod notifications;

pub use approvals::{ApprovalAuthority, HttpApprovalAuthority, StaticApprovalAuthority};
pub use audit::{AuditEvent, AuditSink, HttpAuditSink, LogAuditSink};
pub use bank_channel::{
    BalanceSnapshot, BankChannel, ChannelError, ChannelRegistry, ChannelTransaction,
    HttpBankChannel,
};
pub use credentials::{CredentialStore, StaticCredentialStore, VaultCredentialStore};
pub use invoices::{HttpInvoiceSource, InvoiceSource, StaticInvoiceSource};
pub use notifications::{
    AlertNotification, HttpNotificationSink, LogNotificationSink, NotificationSink,
};
