//! The RFC 959 Passive (`PASV`) command.
//
// This command requests the server-DTP to "listen" on a data port and to
// wait for a connection rather than initiate one upon receipt of a transfer
// command. The response includes the host and port address this server is
// listening on.

use super::passive_common;
use crate::{
    auth::UserDetail,
    server::controlchan::{
        Reply, ReplyCode,
        error::ControlChanError,
        handler::{CommandContext, CommandHandler},
    },
    server::ftpserver::options::PassiveHost,
    storage::{Metadata, StorageBackend},
};
use async_trait::async_trait;
use std::net::{IpAddr, Ipv4Addr};

#[derive(Debug)]
pub struct Pasv;

#[async_trait]
impl<Storage, User> CommandHandler<Storage, User> for Pasv
where
    User: UserDetail + 'static,
    Storage: StorageBackend<User> + 'static,
    Storage::Metadata: Metadata,
{
    #[tracing_attributes::instrument]
    async fn handle(&self, args: CommandContext<Storage, User>) -> Result<Reply, ControlChanError> {
        // The 227 reply format only carries IPv4. The advertised address may
        // be overridden for NAT'ed deployments.
        let ip: Ipv4Addr = match &args.passive_host {
            PassiveHost::Ip(ip) => *ip,
            PassiveHost::FromConnection => match args.local_addr.ip() {
                IpAddr::V4(ip) => ip,
                IpAddr::V6(_) => {
                    return Ok(Reply::new(ReplyCode::CommandNotImplemented, "Use EPSV on IPv6 connections"));
                }
            },
        };

        let port = match passive_common::start_passive_listener(&args).await {
            Some(port) => port,
            None => return Ok(Reply::new(ReplyCode::CantOpenDataConnection, "No data connection established")),
        };

        let octets = ip.octets();
        let p1 = port >> 8;
        let p2 = port - (p1 * 256);

        Ok(Reply::new_with_string(
            ReplyCode::EnteringPassiveMode,
            format!(
                "Entering Passive Mode ({},{},{},{},{},{})",
                octets[0], octets[1], octets[2], octets[3], p1, p2
            ),
        ))
    }
}
