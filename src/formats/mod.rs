//! Parsers for the Wii title formats ES consumes.
//!
//! All parsers follow the same conventions:
//!
//! * **Owned bytes in, typed view out** - [`tmd::Tmd`] and [`ticket::Ticket`]
//!   take the raw blob by value and keep it, because ES hands the exact bytes
//!   (or views built from them) back to guests.
//! * **Structural validation only** - a blob is valid when every field the
//!   parser needs is in bounds. Signatures are never verified.
//! * **Reader wrappers** - the WAD container has a [`wad::WadReader<R>`] that
//!   owns the underlying [`std::io::Read`] + [`std::io::Seek`] stream.
//! * **Crypto is separate** - content decryption uses [`crate::crypto`].
//!
//! ## Format overview
//!
//! | Module     | Format | Description |
//! |------------|--------|-------------|
//! | [`tmd`]    | TMD    | Title metadata: IOS dependency, title ID, content records |
//! | [`ticket`] | Ticket | Licence holding the encrypted title key |
//! | [`wad`]    | WAD    | Installable package: certificates, ticket, TMD, encrypted contents |

pub mod ticket;
pub mod tmd;
pub mod wad;
