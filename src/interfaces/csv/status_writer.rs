use crate::domain::order::OrderId;
use crate::domain::status::{PaymentStatusView, StatusSource};
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct StatusRow<'a> {
    order_id: &'a str,
    is_paid: bool,
    paid_at: Option<DateTime<Utc>>,
    payment_method: Option<&'a str>,
    source: StatusSource,
    needs_reconciliation: bool,
    order_status: &'a str,
    error: Option<&'a str>,
}

/// Writes resolved views as CSV, one row per order.
pub struct StatusWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> StatusWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_view(&mut self, order_id: &OrderId, view: &PaymentStatusView) -> Result<()> {
        self.writer.serialize(StatusRow {
            order_id: order_id.as_str(),
            is_paid: view.is_paid,
            paid_at: view.paid_at,
            payment_method: view.payment_method.as_deref(),
            source: view.source,
            needs_reconciliation: view.needs_reconciliation,
            order_status: &view.order_status,
            error: view.error.as_deref(),
        })?;
        Ok(())
    }

    pub fn write_views<'a>(
        &mut self,
        views: impl IntoIterator<Item = (&'a OrderId, &'a PaymentStatusView)>,
    ) -> Result<()> {
        for (order_id, view) in views {
            self.write_view(order_id, view)?;
        }
        self.flush()
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_writes_header_and_rows() {
        let paid_at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let mut view = PaymentStatusView::loading(paid_at);
        view.is_paid = true;
        view.paid_at = Some(paid_at);
        view.payment_method = Some("card".to_string());
        view.source = StatusSource::Transaction;
        view.needs_reconciliation = true;
        view.order_status = "confirmed".to_string();

        let mut buffer = Vec::new();
        {
            let mut writer = StatusWriter::new(&mut buffer);
            writer.write_views([(&OrderId::from("A"), &view)]).unwrap();
        }
        let output = String::from_utf8(buffer).unwrap();
        let mut lines = output.lines();
        assert_eq!(
            lines.next().unwrap(),
            "order_id,is_paid,paid_at,payment_method,source,needs_reconciliation,order_status,error"
        );
        assert_eq!(
            lines.next().unwrap(),
            "A,true,2024-05-01T12:00:00Z,card,transaction,true,confirmed,"
        );
    }
}
