use clap::Parser;
use core::time::Duration;
use pms_uart::{Command, Config, Handshake, Session};
use std::error::Error;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Serial port path
    #[arg(short, long, default_value = "/dev/ttyUSB0")]
    port: String,

    /// Number of frames to dump, zero for no limit
    #[arg(short, long, default_value_t = 0)]
    count: u64,

    /// Time to wait for each frame in seconds
    #[arg(short, long, default_value_t = 5)]
    timeout: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let args = Args::parse();
    let config = Config::default().handshake(Handshake::Skip);
    let mut sess = Session::open(&args.port, config).await?;

    sess.set_mode(Command::EnterNormal).await?;
    sess.set_mode(Command::EnterActive).await?;

    let mut dumped = 0;

    while args.count == 0 || dumped < args.count {
        let frame = sess
            .wait_timeout(Duration::from_secs(args.timeout))
            .await?;

        println!("Frame {dumped} ({} layout): {frame:#?}", frame.layout());
        dumped += 1;
    }

    // Leave the sensor the way a session expects to find it
    sess.set_mode(Command::EnterPassive).await?;
    sess.close();

    Ok(())
}
