pub mod esplora;
pub mod insight;
pub mod mock;
pub mod oracle;
pub mod retry;
