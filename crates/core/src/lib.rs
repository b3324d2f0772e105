pub mod auth;
pub mod codes;
pub mod config;
pub mod domain;
pub mod errors;
pub mod invoicing;
pub mod pricing;
pub mod stock;
pub mod sync;

pub use auth::{Claims, TokenService};
pub use domain::party::{PartyKey, PartyRef, PartyType, SourceType};
pub use domain::tenant::{Role, TenantContext};
pub use errors::{ApplicationError, DomainError, InterfaceError, InterfaceErrorKind};
pub use invoicing::{InvoiceGenerator, WeeklyInvoiceRequest, WeeklyInvoiceRun};
pub use pricing::{evaluate_quality_adjustments, RateResolver};
pub use stock::{LedgerVerification, StockLedgerPoster};
