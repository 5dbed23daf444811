pub mod needs;
pub mod table;
