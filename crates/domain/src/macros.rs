//! Display/FromStr boilerplate for the closed enums of the sync model.
//!
//! ```rust
//! use outpost_domain::impl_domain_status_conversions;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! pub enum Phase {
//!     Queued,
//!     Delivered,
//! }
//!
//! impl_domain_status_conversions!(Phase {
//!     Queued => "queued",
//!     Delivered => "delivered",
//! });
//!
//! assert_eq!(Phase::Queued.as_str(), "queued");
//! assert_eq!("DELIVERED".parse::<Phase>(), Ok(Phase::Delivered));
//! ```

/// Implements `as_str`, `Display` and case-insensitive `FromStr` for an enum.
///
/// Every variant must be listed; the generated `match` is exhaustive.
#[macro_export]
macro_rules! impl_domain_status_conversions {
    ($enum_name:ident { $($variant:ident => $str:expr),+ $(,)? }) => {
        impl $enum_name {
            /// Stable lowercase name of this variant.
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $str,)+
                }
            }
        }

        impl std::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $enum_name {
            type Err = String;

            fn from_str(s: &str) -> ::std::result::Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($str => Ok(Self::$variant),)+
                    _ => Err(format!("Invalid {}: {}", stringify!($enum_name), s)),
                }
            }
        }
    };
}
