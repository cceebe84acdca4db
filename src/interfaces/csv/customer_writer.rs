use crate::domain::customer::Customer;
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct CustomerRow<'a> {
    customer: u32,
    email: &'a str,
    stripe_id: Option<&'a str>,
    card_brand: Option<&'a str>,
    card_last_four: Option<&'a str>,
}

impl<'a> From<&'a Customer> for CustomerRow<'a> {
    fn from(customer: &'a Customer) -> Self {
        Self {
            customer: customer.id,
            email: &customer.email,
            stripe_id: customer.stripe_id(),
            card_brand: customer.card_brand(),
            card_last_four: customer.card_last_four(),
        }
    }
}

/// Writes the local customer mirror as CSV, one row per customer.
pub struct CustomerWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> CustomerWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_customers(&mut self, customers: impl IntoIterator<Item = Customer>) -> Result<()> {
        for customer in customers {
            self.writer.serialize(CustomerRow::from(&customer))?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writer_output() {
        let mut buffer = Vec::new();
        {
            let mut writer = CustomerWriter::new(&mut buffer);
            writer
                .write_customers(vec![
                    Customer::new(1, "ada@example.com").with_stripe_id("cus_1"),
                    Customer::new(2, "bob@example.com"),
                ])
                .unwrap();
        }

        let output = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines[0], "customer,email,stripe_id,card_brand,card_last_four");
        assert_eq!(lines[1], "1,ada@example.com,cus_1,,");
        assert_eq!(lines[2], "2,bob@example.com,,,");
    }
}
