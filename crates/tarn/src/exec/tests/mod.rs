mod mutation;
mod properties;
mod transaction;
