// Prompt text for the AI meta-commands.
use super::client::CompletionRequest;

const INSTRUCTIONS: &str = "You are an expert PostgreSQL engineer assisting a psql user.
Return only the exact SQL statement to run, formatted and terminated with a semicolon.
Do not use markdown and do not add explanations.";

fn system(schema: &str) -> String {
    if schema.trim().is_empty() {
        format!("{INSTRUCTIONS}\nThe database schema is not available.")
    } else {
        format!("{INSTRUCTIONS}\nCurrent schema of the database (JSON):\n{schema}")
    }
}

pub fn generate(request: &str, schema: &str) -> CompletionRequest {
    CompletionRequest {
        system: system(schema),
        user: format!("Write SQL for this request: {request}"),
    }
}

pub fn fix(code: &str, error: &str, schema: &str) -> CompletionRequest {
    CompletionRequest {
        system: system(schema),
        user: format!("This SQL failed.\nSQL:\n{code}\nError:\n{error}\nReturn the corrected SQL."),
    }
}

#[cfg(test)]
mod tests {
    use super::{fix, generate};

    #[test]
    fn schema_is_embedded_when_known() {
        let request = generate("all users", r#"[{"table_name":"users"}]"#);
        assert!(request.system.contains(r#"[{"table_name":"users"}]"#));
        assert!(request.user.ends_with("all users"));

        let request = generate("all users", "");
        assert!(request.system.contains("not available"));
    }

    #[test]
    fn fix_carries_code_and_error() {
        let request = fix("SELEC 2;", "syntax error at or near \"SELEC\"", "");
        assert!(request.user.contains("SELEC 2;"));
        assert!(request.user.contains("syntax error"));
    }
}
