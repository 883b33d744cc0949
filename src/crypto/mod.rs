pub mod hashing;
pub mod password;
pub mod signing;
pub mod token;
