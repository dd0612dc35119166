//! tests/imap_tests.rs
//! Copia IMAP contra un servidor local guionado.

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    use async_imap::Client;
    use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
    use tokio::net::{TcpListener, TcpStream};

    use crate::error::OutreachError;
    use crate::services::email_service::DRAFT_FLAGS;
    use crate::services::imap_service::ImapMailbox;

    /// Tamaño del literal `{n}` al final de un comando APPEND
    fn literal_len(line: &str) -> usize {
        line.rsplit('{')
            .next()
            .and_then(|tail| tail.trim_end_matches('}').trim_end_matches('+').parse().ok())
            .unwrap_or(0)
    }

    /// Atiende una conexión: sólo existe la carpeta "Drafts".
    /// Guarda cada línea de comando y el contenido recibido por APPEND.
    async fn serve_one(
        listener: TcpListener,
        commands: Arc<Mutex<Vec<String>>>,
        appended: Arc<Mutex<Vec<u8>>>,
    ) {
        let (stream, _) = listener.accept().await.unwrap();
        let (read, mut write) = stream.into_split();
        let mut reader = BufReader::new(read);

        loop {
            let mut line = String::new();
            if reader.read_line(&mut line).await.unwrap() == 0 {
                break;
            }
            let line = line.trim_end().to_string();
            commands.lock().unwrap().push(line.clone());

            let mut parts = line.splitn(3, ' ');
            let tag = parts.next().unwrap_or_default().to_string();
            let command = parts.next().unwrap_or_default().to_uppercase();
            let reply = match command.as_str() {
                "LOGIN" => format!("{tag} OK LOGIN completed\r\n"),
                "SELECT" if line.contains("\"Drafts\"") => format!(
                    "* FLAGS (\\Seen \\Draft)\r\n* 0 EXISTS\r\n* 0 RECENT\r\n{tag} OK [READ-WRITE] SELECT completed\r\n"
                ),
                "SELECT" => format!("{tag} NO Mailbox does not exist\r\n"),
                "APPEND" => {
                    write.write_all(b"+ Ready for literal data\r\n").await.unwrap();
                    let mut data = vec![0u8; literal_len(&line)];
                    reader.read_exact(&mut data).await.unwrap();
                    let mut end = String::new();
                    reader.read_line(&mut end).await.unwrap();
                    appended.lock().unwrap().extend_from_slice(&data);
                    format!("{tag} OK APPEND completed\r\n")
                }
                "LOGOUT" => format!("* BYE logging out\r\n{tag} OK LOGOUT completed\r\n"),
                _ => format!("{tag} BAD unknown command\r\n"),
            };
            write.write_all(reply.as_bytes()).await.unwrap();
            if command == "LOGOUT" {
                break;
            }
        }
    }

    #[tokio::test]
    async fn test_draft_append_carries_flags_to_first_existing_folder() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let commands = Arc::new(Mutex::new(Vec::new()));
        let appended = Arc::new(Mutex::new(Vec::new()));
        let server = tokio::spawn(serve_one(listener, commands.clone(), appended.clone()));

        let mailbox = ImapMailbox::new(
            "127.0.0.1",
            port,
            "hello@growigh.example",
            "secret",
            Duration::from_secs(5),
        );
        let tcp = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let folders = vec!["[Gmail]/Drafts".to_string(), "Drafts".to_string()];
        let content = b"Subject: Hi\r\n\r\nHello Ana\r\n";

        let folder = mailbox
            .append_with(Client::new(tcp), &folders, DRAFT_FLAGS, content)
            .await
            .unwrap();
        server.await.unwrap();

        assert_eq!(folder, "Drafts");
        let commands = commands.lock().unwrap().clone();
        let append = commands
            .iter()
            .find(|c| c.contains("APPEND"))
            .expect("APPEND command sent");
        assert!(append.contains("\"Drafts\""));
        assert!(append.contains(DRAFT_FLAGS));
        assert_eq!(appended.lock().unwrap().as_slice(), content);
    }

    #[tokio::test]
    async fn test_stalled_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        // Acepta la conexión y nunca responde (ni siquiera al handshake TLS)
        let _server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(stream);
        });

        let mailbox = ImapMailbox::new(
            "127.0.0.1",
            port,
            "hello@growigh.example",
            "secret",
            Duration::from_millis(300),
        );
        let started = Instant::now();
        let err = mailbox
            .append_to_first(&["Sent".to_string()], "(\\Seen)", b"body")
            .await
            .unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(5));
        match err {
            OutreachError::Connect { message, .. } => assert!(message.contains("timed out")),
            other => panic!("expected timeout, got {:?}", other),
        }
    }
}
