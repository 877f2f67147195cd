//! Two-phase HELLO handshake followed by the first LSAUPDATE exchange.
//!
//! ```text
//! initiator                       responder
//!   HELLO(weight)        ---->      slot allocated, INIT
//!   TWO_WAY              <----      HELLO
//!   HELLO                ---->      TWO_WAY
//!   LSAUPDATE            ---->      apply
//!   apply                <----      LSAUPDATE
//!   flood (not peer)                flood (not peer)
//! ```

use log::{info, warn};
use tokio::io::{AsyncRead, AsyncWrite};

use super::codec::PacketStream;
use super::flooding::{self, apply_lsa_batch};
use super::messages::{LinkStateAdvertisement, PacketType, SospfPacket};
use super::ports::PortSearchResult;
use super::types::{Link, Metric, RouterDescription, RouterStatus};
use crate::error::{Result, RouterError};
use crate::router::Router;

fn expect_hello(packet: &SospfPacket) -> Result<()> {
    if packet.packet_type.is_hello() {
        Ok(())
    } else {
        Err(RouterError::UnexpectedPacket {
            expected: "HELLO",
            received: packet.packet_type,
        })
    }
}

fn expect_update(packet: &SospfPacket) -> Result<()> {
    if packet.packet_type == PacketType::LsaUpdate {
        Ok(())
    } else {
        Err(RouterError::UnexpectedPacket {
            expected: "LSAUPDATE",
            received: packet.packet_type,
        })
    }
}

fn update_packet(
    router: &Router,
    dst_ip: &str,
    lsas: Vec<LinkStateAdvertisement>,
) -> Result<SospfPacket> {
    SospfPacket::from_description(
        router.description(),
        dst_ip,
        PacketType::LsaUpdate,
        Some(lsas),
        None,
    )
}

/// Drive the handshake from our side towards the link attached to `simulated_ip`.
pub async fn initiate(router: &Router, simulated_ip: &str) -> Result<()> {
    let (remote, weight) = {
        let mut state = router.state().lock().await;
        let link = state
            .ports
            .find_mut(simulated_ip)
            .ok_or_else(|| RouterError::UnknownNeighbor(simulated_ip.to_string()))?;
        if !link.is_two_way() {
            link.set_status(RouterStatus::Init);
        }
        (link.remote.clone(), link.weight)
    };

    let hello = SospfPacket::from_description(
        router.description(),
        &remote.simulated_ip,
        PacketType::Hello,
        None,
        Some(weight),
    )?;
    let mut stream = PacketStream::connect(&remote.process_addr(), router.io_timeout()).await?;
    stream.send(&hello).await?;

    let reply = stream.recv().await?;
    if reply.packet_type == PacketType::NoPortsAvailable {
        let mut state = router.state().lock().await;
        if let Some(index) = state.ports.position_of(simulated_ip) {
            state.ports.detach(index)?;
        }
        warn!("{} has no ports available, link removed", simulated_ip);
        return Err(RouterError::RemoteNoPortsAvailable(simulated_ip.to_string()));
    }
    expect_hello(&reply)?;
    info!("received HELLO from {};", reply.src_ip);

    {
        let mut state = router.state().lock().await;
        let link = state
            .ports
            .find_mut(simulated_ip)
            .ok_or_else(|| RouterError::UnknownNeighbor(simulated_ip.to_string()))?;
        link.set_status(RouterStatus::TwoWay);
    }
    info!("set {} state to TWO_WAY", simulated_ip);
    stream.send(&hello).await?;

    let ours = {
        let mut state = router.state().lock().await;
        state.refresh_own_lsa(router.description())?;
        state.lsd.all_values()
    };
    stream
        .send(&update_packet(router, simulated_ip, ours)?)
        .await?;

    let theirs = stream.recv().await?;
    expect_update(&theirs)?;
    let outcome = {
        let mut state = router.state().lock().await;
        apply_lsa_batch(
            &mut state,
            router.description(),
            &theirs.src_ip,
            theirs.lsa_batch(),
        )?
    };
    stream.shutdown().await;

    // The peer got our snapshot before its batch was applied; a re-issued LSA must reach it too.
    let exclude = if outcome.own_reissued {
        None
    } else {
        Some(simulated_ip)
    };
    flooding::flood(router, exclude).await;
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Claim {
    Refused,
    Created,
    Reused,
}

/// Reply HELLO and wait for the acknowledging HELLO that promotes `sender` to TWO_WAY.
async fn confirm_two_way<S>(router: &Router, stream: &mut PacketStream<S>, sender: &str) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let weight = {
        let state = router.state().lock().await;
        state.ports.find(sender).map(|link| link.weight)
    };
    let reply = SospfPacket::from_description(
        router.description(),
        sender,
        PacketType::Hello,
        None,
        weight,
    )?;
    stream.send(&reply).await?;

    let ack = stream.recv().await?;
    expect_hello(&ack)?;
    info!("received HELLO from {};", ack.src_ip);

    let mut state = router.state().lock().await;
    let link = state
        .ports
        .find_mut(sender)
        .ok_or_else(|| RouterError::UnknownNeighbor(sender.to_string()))?;
    link.set_status(RouterStatus::TwoWay);
    state.refresh_own_lsa(router.description())?;
    Ok(())
}

/// Free a slot this handshake allocated if it never reached TWO_WAY.
async fn release_pending(router: &Router, sender: &str) {
    let mut state = router.state().lock().await;
    let Some(index) = state.ports.position_of(sender) else {
        return;
    };
    let pending = state.ports.get(index).is_some_and(|link| !link.is_two_way());
    if pending && state.ports.detach(index).is_ok() {
        warn!("Handshake with {} abandoned, port {} released", sender, index);
    }
}

/// Answer a HELLO (or CONNECT) that opened an inbound connection.
pub async fn respond<S>(router: &Router, mut stream: PacketStream<S>, hello: SospfPacket) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let sender = hello.src_ip.clone();
    info!("received HELLO from {};", sender);

    let claim = {
        let mut state = router.state().lock().await;
        match state.ports.search(&sender) {
            PortSearchResult::Full => Claim::Refused,
            PortSearchResult::Found(_) => {
                let weight = hello
                    .weight
                    .ok_or_else(|| RouterError::MissingWeight(sender.clone()))?;
                let remote = RouterDescription::new(
                    hello.src_process_ip.as_str(),
                    hello.src_process_port,
                    sender.as_str(),
                    Metric::Cost(weight),
                )?;
                let mut link = Link::new(remote, weight)?;
                link.set_status(RouterStatus::Init);
                state.ports.attach(link)?;
                Claim::Created
            }
            PortSearchResult::Duplicate(index) => {
                if let Some(link) = state.ports.get_mut(index) {
                    // The initiator's weight wins so both sides advertise the same cost.
                    if let Some(weight) = hello.weight.filter(|w| *w > 0) {
                        link.weight = weight;
                    }
                    link.remote.process_ip = hello.src_process_ip.clone();
                    link.remote.process_port = hello.src_process_port;
                    if !link.is_two_way() {
                        link.set_status(RouterStatus::Init);
                    }
                }
                Claim::Reused
            }
        }
    };

    if claim == Claim::Refused {
        warn!("No free port for {}, refusing", sender);
        let refusal = SospfPacket::from_description(
            router.description(),
            &sender,
            PacketType::NoPortsAvailable,
            None,
            None,
        )?;
        stream.send(&refusal).await?;
        stream.shutdown().await;
        return Ok(());
    }
    info!("set {} state to INIT", sender);

    if let Err(e) = confirm_two_way(router, &mut stream, &sender).await {
        if claim == Claim::Created {
            release_pending(router, &sender).await;
        }
        return Err(e);
    }
    info!("set {} state to TWO_WAY", sender);

    let theirs = stream.recv().await?;
    expect_update(&theirs)?;
    let ours = {
        let mut state = router.state().lock().await;
        apply_lsa_batch(&mut state, router.description(), &sender, theirs.lsa_batch())?;
        state.lsd.all_values()
    };
    stream.send(&update_packet(router, &sender, ours)?).await?;
    stream.shutdown().await;

    flooding::flood(router, Some(&sender)).await;
    Ok(())
}
