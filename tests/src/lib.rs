pub mod mocks;

#[cfg(test)]
mod crash_ordering;
#[cfg(test)]
mod esplora_client;
#[cfg(test)]
mod relay_flow;
#[cfg(test)]
mod util;
