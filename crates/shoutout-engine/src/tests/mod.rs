mod common;
mod durability;
