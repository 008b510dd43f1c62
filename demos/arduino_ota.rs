//! Advertises a firmware upload endpoint the way IDE network discovery
//! expects it.

use std::{io, net::IpAddr};

use log::LevelFilter;
use halloo::responder::SyncResponder;
use halloo::wire::name::Label;

fn main() -> io::Result<()> {
    env_logger::Builder::new()
        .filter_module(env!("CARGO_PKG_NAME"), LevelFilter::Trace)
        .filter_module(env!("CARGO_CRATE_NAME"), LevelFilter::Trace)
        .init();

    let addr = if_addrs::get_if_addrs()?
        .into_iter()
        .find_map(|interface| match interface.ip() {
            IpAddr::V4(ip) if ip.is_private() => Some(ip),
            _ => None,
        })
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                "no local network interface with private IPv4 address found",
            )
        })?;

    let hostname: Label = "my_board".parse().unwrap();
    let mut responder = SyncResponder::new(hostname, addr.into())?;
    responder.set_board("esp8266");
    responder.enable_arduino(8266, false)?;
    responder.listen()?;

    Ok(())
}
