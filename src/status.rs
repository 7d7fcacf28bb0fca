//! Status vocabularies and their transition tables.
//!
//! Every status column is stored as lowercase text. Writes that change a status
//! go through [`Lifecycle::transition`], which only admits pairs listed in the
//! type's table. Re-asserting the current status is always allowed.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A status change that the transition table does not admit.
#[derive(Debug, Error)]
#[error("invalid {entity} status transition: {from} -> {to}")]
pub struct TransitionError {
    pub entity: &'static str,
    pub from: &'static str,
    pub to: &'static str,
}

/// A text value that is not part of the vocabulary.
#[derive(Debug, Error)]
#[error("unknown {kind} value {value:?}")]
pub struct UnknownValue {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        $name:ident as $kind:literal {
            $($variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
        pub enum $name {
            $(
                #[serde(rename = $text)]
                #[sqlx(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownValue;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(UnknownValue {
                        kind: $kind,
                        value: other.to_owned(),
                    }),
                }
            }
        }
    };
}

/// A status with an enforced transition table.
pub trait Lifecycle: Copy + Eq + Sized + 'static {
    /// Name used in error messages.
    const ENTITY: &'static str;
    /// Legal `(from, to)` pairs.
    const TRANSITIONS: &'static [(Self, Self)];

    fn label(self) -> &'static str;

    fn can_transition_to(self, to: Self) -> bool {
        self == to || Self::TRANSITIONS.contains(&(self, to))
    }

    /// Validate a change from `self` to `to`, returning the new status.
    fn transition(self, to: Self) -> Result<Self, TransitionError> {
        if self.can_transition_to(to) {
            Ok(to)
        } else {
            Err(TransitionError {
                entity: Self::ENTITY,
                from: self.label(),
                to: to.label(),
            })
        }
    }
}

macro_rules! lifecycle {
    ($name:ident, $entity:literal, [$(($from:ident, $to:ident)),* $(,)?]) => {
        impl Lifecycle for $name {
            const ENTITY: &'static str = $entity;
            const TRANSITIONS: &'static [(Self, Self)] = &[$((Self::$from, Self::$to)),*];

            fn label(self) -> &'static str {
                self.as_str()
            }
        }
    };
}

text_enum! {
    /// Who published a post.
    PostType as "post type" {
        Employer => "employer",
        Employee => "employee",
    }
}

text_enum! {
    PostStatus as "post status" {
        Pending => "pending",
        Approved => "approved",
        Hidden => "hidden",
    }
}

text_enum! {
    /// Progress of a paid homepage feature.
    HomepagePaymentStatus as "homepage payment status" {
        NotRequested => "none",
        Pending => "pending",
        Approved => "approved",
        Rejected => "rejected",
    }
}

text_enum! {
    PaymentStatus as "payment status" {
        Pending => "pending",
        Approved => "approved",
        Rejected => "rejected",
        Hidden => "hidden",
    }
}

text_enum! {
    /// What a payment buys. Decides which linked row an admin decision cascades to.
    PaymentPurpose as "payment purpose" {
        Listing => "listing",
        Homepage => "homepage",
        Unlock => "unlock",
    }
}

text_enum! {
    UnlockStatus as "unlock status" {
        Pending => "pending",
        Paid => "paid",
        Approved => "approved",
        Rejected => "rejected",
    }
}

text_enum! {
    SubmissionStatus as "submission status" {
        Pending => "pending",
        Read => "read",
        Replied => "replied",
        Closed => "closed",
    }
}

text_enum! {
    SubmissionPriority as "submission priority" {
        Low => "low",
        Normal => "normal",
        High => "high",
        Urgent => "urgent",
    }
}

text_enum! {
    UserRole as "user role" {
        Admin => "admin",
        Member => "member",
    }
}

lifecycle!(PostStatus, "post", [
    (Pending, Approved),
    (Pending, Hidden),
    (Approved, Hidden),
    (Hidden, Approved),
]);

lifecycle!(HomepagePaymentStatus, "homepage payment", [
    (NotRequested, Pending),
    (Pending, Approved),
    (Pending, Rejected),
    (Rejected, Pending),
    (Approved, NotRequested),
]);

lifecycle!(PaymentStatus, "payment", [
    (Pending, Approved),
    (Pending, Rejected),
    (Pending, Hidden),
    (Approved, Hidden),
    (Rejected, Hidden),
]);

lifecycle!(UnlockStatus, "unlock request", [
    (Pending, Paid),
    (Pending, Rejected),
    (Paid, Approved),
    (Paid, Rejected),
]);

lifecycle!(SubmissionStatus, "contact submission", [
    (Pending, Read),
    (Pending, Replied),
    (Pending, Closed),
    (Read, Replied),
    (Read, Closed),
    (Replied, Closed),
]);

impl Default for SubmissionPriority {
    fn default() -> Self {
        Self::Normal
    }
}

impl UnlockStatus {
    /// Whether the request still blocks a new one for the same visitor and post.
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::Paid)
    }
}
