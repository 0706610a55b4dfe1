use std::env::args;
use std::process::exit;
use std::str::FromStr;
use tokio::net::TcpStream;
use tokio_xmpp::parsers::ns;
use tokio_xmpp::{client_login, BareJid, BindConfig, Config, Element, Event, StreamManagement};

fn echo(message: &Element) -> Option<Element> {
    if message.attr("type") == Some("error") {
        return None;
    }
    let body = message.get_child("body", ns::JABBER_CLIENT)?;
    Some(
        Element::builder("message", ns::JABBER_CLIENT)
            .attr("to", message.attr("from"))
            .attr("type", message.attr("type"))
            .append(body.clone())
            .build(),
    )
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::init();

    let args: Vec<String> = args().collect();
    if args.len() != 4 {
        println!("Usage: {} <jid> <password> <host:port>", args[0]);
        exit(1);
    }
    let jid = BareJid::from_str(&args[1]).expect(&format!("Invalid JID: {}", &args[1]));
    let config = Config::new(jid, args[2].as_str())
        .with_user_agent(
            Config::generate_device_id(),
            Some(String::from("echo_bot")),
            None,
        )
        .with_bind(BindConfig::new("echo_bot").with_stream_management());

    let mut session: Option<StreamManagement> = None;
    loop {
        let tcp = TcpStream::connect(&args[3]).await.expect("connect");
        let mut stream = match client_login(tcp, &config, session.take()).await {
            Ok(stream) => stream,
            Err(e) => {
                println!("Login failed: {}", e);
                exit(1);
            }
        };

        while let Some(event) = stream.next_event().await {
            match event {
                Ok(Event::Online { bound_jid, resumed }) => {
                    println!("Online as {} (resumed: {})", bound_jid, resumed);
                    if !resumed {
                        let presence = Element::builder("presence", ns::JABBER_CLIENT).build();
                        stream.send_stanza(presence).await.expect("send presence");
                    }
                }
                Ok(Event::Stanza(stanza)) => {
                    if !stanza.is("message", ns::JABBER_CLIENT) {
                        continue;
                    }
                    if let Some(reply) = echo(&stanza) {
                        stream.send_stanza(reply).await.expect("send reply");
                    }
                }
                Ok(Event::StreamManagement(event)) => println!("Stream management: {:?}", event),
                Ok(Event::Disconnected(e)) => println!("Disconnected: {}", e),
                Err(e) => println!("Error: {}", e),
            }
        }

        let previous = stream.into_session();
        if !previous.can_resume() {
            break;
        }
        println!("Reconnecting to resume the session…");
        session = Some(previous);
    }
}
