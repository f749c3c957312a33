use crate::commands::{async_runtime, load_config, open_migrated, CommandResult, Schema};

pub fn run() -> CommandResult {
    let config = match load_config("migrate") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match async_runtime("migrate") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let memory_url = config.memory.effective_url(&config.database);
    let result = runtime.block_on(async {
        let comments =
            open_migrated("migrate", &config.database.url, Schema::Comments, &config).await?;
        comments.close().await;
        let checkpoints =
            open_migrated("migrate", &memory_url, Schema::Checkpoints, &config).await?;
        checkpoints.close().await;
        Ok::<(), CommandResult>(())
    });

    match result {
        Ok(()) => CommandResult::success(
            "migrate",
            format!(
                "applied pending migrations to `{}` and `{memory_url}`",
                config.database.url
            ),
        ),
        Err(failure) => failure,
    }
}
