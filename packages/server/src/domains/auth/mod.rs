// Bearer token verification. Accounts and token issuance live in the account service.

pub mod jwt;

pub use jwt::{Claims, JwtService};
