//! Services shared across clients

mod cards;

pub use cards::CardService;
