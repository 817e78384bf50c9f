//! Boson identity model: 256-bit node identifiers, Ed25519/X25519-backed
//! node identities, the three value variants the DHT stores, peer
//! announcements, and the signed identity-object family (Card, Credential,
//! Vouch).

pub mod card;
pub mod claims;
pub mod credential;
pub mod error;
pub mod id;
pub mod identity;
pub mod peer_info;
pub mod value;
pub mod vouch;

pub use card::Card;
pub use claims::Claims;
pub use credential::Credential;
pub use error::{IdentityError, ObjectError, ValueError};
pub use id::{Id, ID_BITS, ID_LEN};
pub use identity::{CryptoContext, Identity, NodeIdentity};
pub use peer_info::{Fingerprint, PeerInfo};
pub use value::{Value, ValueKind, MAX_VALUE_SIZE};
pub use vouch::{count_valid_vouches, Vouch};
