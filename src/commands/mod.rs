pub mod general;
pub mod links;
pub mod verification;
pub mod war;

pub use general::{help, logs, ping};
pub use links::{link, links, sync_roles, unlink};
pub use verification::{cancel_verification, verify};
pub use war::{cwl_status, missing_attacks};
