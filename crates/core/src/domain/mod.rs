pub mod intake;
pub mod invoice;
pub mod master;
pub mod party;
pub mod rate_card;
pub mod stock;
pub mod tenant;
pub mod values;
