use std::time::Duration;

use taskrelay::{Completion, Receiver, ReceiverOptions, Task, TaskHandler};
use taskrelay_frame::DEFAULT_MAX_FRAME;
use tracing::info;

use crate::cmd::{parse_duration, ServeArgs};
use crate::exit::{io_error, receiver_error, CliResult, SUCCESS};

pub fn run(args: ServeArgs) -> CliResult<i32> {
    let delay = args
        .delay
        .as_deref()
        .map(parse_duration)
        .transpose()?
        .unwrap_or_default();
    let handler = EchoHandler {
        delay,
        status_code: args.status_code,
    };
    let options = ReceiverOptions {
        transport: args.transport,
        host: args.host,
        port: args.port,
        max_frame_size: args.max_frame_size.unwrap_or(DEFAULT_MAX_FRAME),
        max_pending_replies: args.max_pending,
        ..ReceiverOptions::default()
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| io_error("runtime setup failed", err))?;
    runtime.block_on(serve(options, handler))
}

async fn serve(options: ReceiverOptions, handler: EchoHandler) -> CliResult<i32> {
    let mut receiver = Receiver::builder()
        .options(options)
        .handler(handler)
        .on_started(|addr| info!(%addr, "ready for tasks"))
        .start()
        .await
        .map_err(|err| receiver_error("start failed", err))?;

    tokio::signal::ctrl_c()
        .await
        .map_err(|err| io_error("signal handler setup failed", err))?;
    info!("interrupt received; shutting down");

    receiver
        .stop()
        .await
        .map_err(|err| receiver_error("stop failed", err))?;
    Ok(SUCCESS)
}

/// Replies with the task it was given.
struct EchoHandler {
    delay: Duration,
    status_code: u16,
}

impl TaskHandler for EchoHandler {
    fn handle(&self, task: Task, completion: Completion) {
        info!(
            task_id = task.task_id.as_deref(),
            task_type = ?task.task_type(),
            peer = %completion.peer_addr(),
            "echoing task"
        );
        let task = echo_reply(task, self.status_code);

        if self.delay.is_zero() {
            completion.succeed(task);
            return;
        }
        let delay = self.delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            completion.succeed(task);
        });
    }
}

fn echo_reply(mut task: Task, status_code: u16) -> Task {
    let response = task.response_mut();
    if response.status_code.is_none() {
        response.status_code = Some(status_code);
    }
    task
}
