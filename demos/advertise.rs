//! Advertises this machine and a service on the local network.

use std::{env, io, net::IpAddr, process};

use log::LevelFilter;
use halloo::responder::SyncResponder;
use halloo::service::ServiceType;
use halloo::wire::name::Label;

fn main() -> io::Result<()> {
    env_logger::Builder::new()
        .filter_module(env!("CARGO_PKG_NAME"), LevelFilter::Trace)
        .filter_module(env!("CARGO_CRATE_NAME"), LevelFilter::Trace)
        .init();

    let args = env::args().skip(1).collect::<Vec<_>>();
    let service: ServiceType = match &*args {
        [] => "_demo._tcp".parse().unwrap(),
        [ty] => match ty.parse() {
            Ok(ty) => ty,
            Err(e) => {
                eprintln!("invalid service type '{ty}': {e}");
                process::exit(1);
            }
        },
        _ => {
            eprintln!("usage: advertise [servicetype]");
            process::exit(1);
        }
    };

    // FIXME: there doesn't seem to be a good way to find the default interface/IP address that 0.0.0.0 binds to
    let local_addrs = if_addrs::get_if_addrs()?
        .into_iter()
        .filter_map(|interface| match interface.ip() {
            IpAddr::V4(ip) if ip.is_private() => Some(ip),
            _ => None,
        })
        .collect::<Vec<_>>();

    let (&first_addr, more_addrs) = match &*local_addrs {
        [first, rest @ ..] => (first, rest),
        _ => {
            return Err(io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                "no local network interface with private IPv4 address found",
            ));
        }
    };

    let hostname: Label = "my_hostname".parse().unwrap();
    let mut responder = SyncResponder::new(hostname, first_addr.into())?;
    for &addr in more_addrs {
        responder.add_address(addr.into())?;
    }
    responder.add_service(service, 1234)?;
    responder.listen()?;

    Ok(())
}
