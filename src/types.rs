/// Shared domain vocabulary used by the store, services and handlers.
///
/// Rows keep their status columns as plain strings; these enums are the
/// validated view of those strings at the API edge.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Error returned when a string does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {}: {}", self.kind, self.value)
    }
}

impl std::error::Error for UnknownVariant {}

macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident, $kind:literal { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(UnknownVariant { kind: $kind, value: other.to_string() }),
                }
            }
        }
    };
}

string_enum!(
    /// Profile role. `admin` passes every role and permission check.
    UserRole, "role" {
        User => "user",
        Admin => "admin",
        Partner => "partner",
    }
);

string_enum!(
    ApplicationStatus, "application status" {
        Draft => "draft",
        Pending => "pending",
        Submitted => "submitted",
        UnderReview => "under_review",
        Approved => "approved",
        Funded => "funded",
        Active => "active",
        Completed => "completed",
        Rejected => "rejected",
    }
);

string_enum!(
    LoanStatus, "loan status" {
        Pending => "pending",
        Active => "active",
        Completed => "completed",
        Defaulted => "defaulted",
    }
);

string_enum!(
    PaymentStatus, "payment status" {
        Pending => "pending",
        Paid => "paid",
        Failed => "failed",
    }
);

string_enum!(
    DocumentType, "document type" {
        NationalId => "national_id",
        Passport => "passport",
        DriversLicense => "drivers_license",
        Payslip => "payslip",
        BankStatement => "bank_statement",
        EmploymentLetter => "employment_letter",
        LoanAgreement => "loan_agreement",
        Other => "other",
    }
);

string_enum!(
    VerificationStatus, "verification status" {
        Pending => "pending",
        Verified => "verified",
        Rejected => "rejected",
        InProgress => "in_progress",
        RequiresReview => "requires_review",
    }
);

string_enum!(
    SyncType, "sync type" {
        Full => "full",
        Partial => "partial",
        Incremental => "incremental",
    }
);

string_enum!(
    TokenType, "token type" {
        Access => "access",
        Refresh => "refresh",
    }
);

string_enum!(
    TaskStatus, "task status" {
        Todo => "todo",
        InProgress => "in_progress",
        Done => "done",
    }
);

string_enum!(
    MessageDirection, "message direction" {
        Inbound => "inbound",
        Outbound => "outbound",
    }
);

string_enum!(
    /// Delivery states reported by Twilio plus our own `received` for inbound rows.
    MessageStatus, "message status" {
        Queued => "queued",
        Sent => "sent",
        Delivered => "delivered",
        Read => "read",
        Failed => "failed",
        Undelivered => "undelivered",
        Received => "received",
    }
);
