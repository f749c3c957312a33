use parley_db::{CheckpointStore, SqlCheckpointStore};

use crate::commands::{
    async_runtime, load_config, open_migrated, CommandResult, Schema, EXIT_PERSISTENCE,
};

const COMMAND: &str = "history";

/// Reads the transcript straight from the durable checkpoint store.
pub fn run(thread_id: &str) -> CommandResult {
    let config = match load_config(COMMAND) {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match async_runtime(COMMAND) {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let url = config.memory.effective_url(&config.database);
    let result = runtime.block_on(async {
        let pool = open_migrated(COMMAND, &url, Schema::Checkpoints, &config).await?;
        let store = SqlCheckpointStore::new(pool.clone());
        let checkpoint = store.load(thread_id).await.map_err(|error| {
            CommandResult::failure(COMMAND, "persistence", error.to_string(), EXIT_PERSISTENCE)
        })?;
        pool.close().await;
        Ok::<_, CommandResult>(checkpoint)
    });

    match result {
        Ok(Some(checkpoint)) if !checkpoint.state.messages().is_empty() => {
            let transcript = checkpoint
                .state
                .messages()
                .iter()
                .map(|message| format!("{}: {}", message.role.as_str(), message.content))
                .collect::<Vec<_>>()
                .join("\n");
            CommandResult::success(COMMAND, transcript)
        }
        Ok(_) => CommandResult::success(COMMAND, format!("no messages in thread `{thread_id}`")),
        Err(failure) => failure,
    }
}
