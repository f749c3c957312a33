use parley_db::statement_count;

pub const SQL_REFUSAL_MESSAGE: &str =
    "I can only run read-only queries, so I did not run the statement generated for that request.";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardrailDecision {
    Allow,
    Deny { reason_code: &'static str, user_message: String },
}

/// Gate between generated SQL and the executor.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GuardrailPolicy;

impl GuardrailPolicy {
    /// Allows a single statement whose trimmed text starts with `SELECT`, ignoring case.
    pub fn evaluate_sql(&self, statement: &str) -> GuardrailDecision {
        let trimmed = statement.trim();
        if trimmed.is_empty() {
            return deny("empty_statement");
        }

        let starts_with_select = trimmed
            .get(..6)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case("SELECT"));
        if !starts_with_select {
            return deny("non_select_statement");
        }

        // `SELECT 1; DELETE FROM comments` passes the prefix test.
        if statement_count(trimmed) != 1 {
            return deny("multiple_statements");
        }

        GuardrailDecision::Allow
    }
}

fn deny(reason_code: &'static str) -> GuardrailDecision {
    GuardrailDecision::Deny { reason_code, user_message: SQL_REFUSAL_MESSAGE.to_string() }
}
