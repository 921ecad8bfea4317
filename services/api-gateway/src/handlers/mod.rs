pub mod approvals;
pub mod documents;
pub mod health;
pub mod invoices;

pub use approvals::*;
pub use documents::*;
pub use health::*;
pub use invoices::*;
