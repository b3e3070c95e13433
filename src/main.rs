/// Entry point of the Creo Manager daemon.
///
/// Configuration is read from the environment, see [`creo_manager::config::Config`].
///
/// # Examples
///
/// ```bash
/// RUST_LOG=info CGROUP_ROOT=/sys/fs/cgroup LISTEN_ADDR=127.0.0.1:3000 cargo run
/// ```
#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    creo_manager::run().await
}
