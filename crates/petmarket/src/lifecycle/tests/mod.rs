mod common;
mod pets;
