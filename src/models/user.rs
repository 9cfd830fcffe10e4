use zeroize::{Zeroize, ZeroizeOnDrop};

/// Represents a user in the system.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct User {
    /// The store-assigned identifier.
    pub id: i32,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
}

/// The fields submitted by the registration form, ready to insert.
///
/// `password` holds whatever the active credential policy stores: the raw
/// password by default, a PHC hash string when hardening is enabled.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct NewUser {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
}

/// A stored user together with its stored password, as needed to verify a hash.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct StoredCredentials {
    #[zeroize(skip)]
    pub user: User,
    pub password: String,
}
