use parley_agent::ChatRuntime;
use tracing::info;

use crate::commands::{
    async_runtime, load_config, open_migrated, CommandResult, Schema, EXIT_RUNTIME_INIT,
};

const COMMAND: &str = "ask";

/// Runs one turn against the configured model and stores, printing the answer as the message.
pub fn run(thread_id: &str, user_id: &str, question: &str) -> CommandResult {
    let config = match load_config(COMMAND) {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match async_runtime(COMMAND) {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = open_migrated(COMMAND, &config.database.url, Schema::Comments, &config).await?;
        let chat = ChatRuntime::from_config(&config, pool.clone()).await.map_err(|error| {
            CommandResult::failure(COMMAND, "runtime_init", error.to_string(), EXIT_RUNTIME_INIT)
        })?;

        let outcome = chat
            .run_turn(thread_id, user_id, question, "cli")
            .await
            .map_err(|error| CommandResult::from_application_error(COMMAND, error))?;
        pool.close().await;
        Ok::<_, CommandResult>(outcome)
    });

    match result {
        Ok(outcome) => {
            info!(
                event_name = "cli.ask.completed",
                correlation_id = "cli",
                thread_id = %outcome.thread_id,
                degradations = outcome.degradations.len(),
                "question answered"
            );
            CommandResult::success(COMMAND, outcome.answer)
        }
        Err(failure) => failure,
    }
}
