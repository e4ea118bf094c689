pub mod crm_service;
pub mod document_service;
pub mod loan_service;
pub mod whatsapp_service;

pub use crm_service::{CrmError, CrmService};
pub use document_service::{DocumentError, DocumentService};
pub use loan_service::{LoanError, LoanService};
pub use whatsapp_service::{WhatsAppError, WhatsAppService};
