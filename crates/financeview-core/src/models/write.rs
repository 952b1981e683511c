use time::Date;

use super::RecordId;

#[derive(Debug, Clone, PartialEq)]
pub struct CreateExpenseCommand {
    pub date: Date,
    pub description_id: RecordId,
    pub amount: f64,
    pub comment: String,
}
