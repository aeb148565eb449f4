use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Returned when a stored or submitted string is not a known enum value
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind}: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

// Declares a closed enum whose serde, sqlx and display forms all share one
// wire string per variant.
macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident ($kind:literal) {
            $( $(#[$vmeta:meta])* $variant:ident => $wire:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
        pub enum $name {
            $(
                $(#[$vmeta])*
                #[serde(rename = $wire)]
                #[cfg_attr(feature = "sqlx", sqlx(rename = $wire))]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $wire),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($wire => Ok($name::$variant),)+
                    other => Err(ParseEnumError {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

// ============================================================================
// Identity
// ============================================================================

wire_enum! {
    /// The single role a user holds inside their organization
    pub enum Role ("role") {
        /// Full administrative rights within one organization
        Owner => "Owner",
        /// Manages clients, projects, tasks and invoices
        Staff => "Staff",
        /// Portal login restricted to its linked client record
        Client => "Client",
    }
}

impl Role {
    /// Owner or Staff: the roles that operate the agency side of the app
    pub fn is_staff(&self) -> bool {
        matches!(self, Role::Owner | Role::Staff)
    }

    /// Roles an Owner may hand out through team management
    pub fn assignable() -> &'static [Role] {
        &[Role::Staff, Role::Client]
    }
}

wire_enum! {
    /// Who performed an action: recorded on activity entries, files and comments
    pub enum ActorKind ("actor type") {
        Staff => "staff",
        Client => "client",
        System => "system",
    }
}

impl ActorKind {
    /// Classify a (possibly absent) role the way audit entries do
    pub fn of_role(role: Option<Role>) -> Self {
        match role {
            None => ActorKind::System,
            Some(Role::Client) => ActorKind::Client,
            Some(_) => ActorKind::Staff,
        }
    }
}

// ============================================================================
// Work tracking
// ============================================================================

wire_enum! {
    pub enum ProjectStatus ("project status") {
        Draft => "Draft",
        Active => "Active",
        WaitingOnClient => "Waiting on Client",
        Delivered => "Delivered",
        Completed => "Completed",
        Archived => "Archived",
    }
}

wire_enum! {
    pub enum ProjectPriority ("project priority") {
        Low => "low",
        Medium => "medium",
        High => "high",
    }
}

wire_enum! {
    pub enum TaskStatus ("task status") {
        Todo => "Todo",
        InProgress => "In Progress",
        Blocked => "Blocked",
        Done => "Done",
    }
}

wire_enum! {
    /// Category of an uploaded project file
    pub enum FileType ("file type") {
        Deliverable => "Deliverable",
        ClientUpload => "Client Upload",
        Contract => "Contract",
        Other => "Other",
    }
}

impl FileType {
    /// File types a user with the given role may upload
    pub fn allowed_for(role: Role) -> &'static [FileType] {
        match role {
            Role::Client => &[FileType::ClientUpload],
            _ => FileType::ALL,
        }
    }
}

// ============================================================================
// Billing
// ============================================================================

wire_enum! {
    pub enum InvoiceStatus ("invoice status") {
        Draft => "Draft",
        Sent => "Sent",
        Paid => "Paid",
        Overdue => "Overdue",
        Void => "Void",
    }
}

impl InvoiceStatus {
    /// Only drafts may have their content edited or be sent
    pub fn is_draft(&self) -> bool {
        matches!(self, InvoiceStatus::Draft)
    }

    /// Sent or overdue invoices are awaiting payment
    pub fn is_outstanding(&self) -> bool {
        matches!(self, InvoiceStatus::Sent | InvoiceStatus::Overdue)
    }

    /// Paid and void invoices are final
    pub fn is_final(&self) -> bool {
        matches!(self, InvoiceStatus::Paid | InvoiceStatus::Void)
    }
}

// ============================================================================
// Audit
// ============================================================================

wire_enum! {
    /// Type tag of the record an activity entry points at
    pub enum SubjectKind ("subject type") {
        Organization => "organization",
        User => "user",
        Client => "client",
        Project => "project",
        Task => "task",
        ProjectFile => "project_file",
        Comment => "comment",
        Invoice => "invoice",
    }
}

// ============================================================================
// Tests
// ============================================================================
