//! Built-in stream filters

mod all;
mod rate;
mod regexp;

pub use all::AllFilter;
pub use rate::RateFilter;
pub use regexp::RegExpFilter;
