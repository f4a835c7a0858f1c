use clap::Parser;
use core::time::Duration;
use pms_uart::{Command, Config, Error as PmsError, Handshake, Session};
use std::error::Error;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Serial port path
    #[arg(short, long, default_value = "/dev/ttyUSB0")]
    port: String,

    /// Number of readings to take
    #[arg(short, long, default_value_t = 10)]
    count: u32,

    /// Interval between readings in seconds
    #[arg(short, long, default_value_t = 2)]
    interval: u64,

    /// Time to wait for each reading in milliseconds
    #[arg(short, long, default_value_t = 2000)]
    timeout: u64,

    /// Put the sensor into standby mode when done
    #[arg(short, long)]
    standby: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let args = Args::parse();
    let config = Config::default().handshake(Handshake::Required);
    let mut sess = Session::open(&args.port, config).await?;

    println!(
        "Connected to sensor, protocol version {:#04x}",
        sess.version().unwrap_or_default()
    );

    for i in 0..args.count {
        if i > 0 {
            tokio::time::sleep(Duration::from_secs(args.interval)).await;
        }

        let frame = match sess.read(Duration::from_millis(args.timeout)).await {
            Ok(frame) => frame,
            Err(PmsError::Timeout) => {
                println!("Reading {i} timed out");
                continue;
            }
            Err(err) => return Err(err.into()),
        };
        let pm = frame.atmospheric;

        print!(
            "PM1.0: {:>4} ug/m3  PM2.5: {:>4} ug/m3  PM10: {:>4} ug/m3",
            pm.pm1_0, pm.pm2_5, pm.pm10
        );

        if let Some(ext) = frame.extended {
            print!(
                "  HCHO: {:.3} mg/m3  Temp: {:.1} C  RH: {:.1} %",
                f32::from(ext.hcho) / 1000.0,
                f32::from(ext.temperature) / 10.0,
                f32::from(ext.humidity) / 10.0
            );
        }

        println!();
    }

    if args.standby {
        sess.set_mode(Command::EnterStandby).await?;
    }

    sess.close();

    Ok(())
}
