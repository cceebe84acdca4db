pub mod customer_writer;
pub mod operation_reader;
