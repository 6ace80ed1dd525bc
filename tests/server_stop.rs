//! Process-wide stop. Kept in its own test binary: it stops every server in
//! the process.

use std::thread;
use std::time::{Duration, Instant};

use ipc::server::Echo;
use ipc::{Client, RecvOutcome};

#[test]
fn server_stop_ends_server_start() {
    ipc::init().unwrap();

    // Find a free port, then release it for the server.
    let port = {
        let free = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        free.local_addr().unwrap().port()
    };

    let runner = thread::spawn(move || ipc::server_start("127.0.0.1", port, Echo));

    let client = loop {
        match Client::connect("127.0.0.1", port) {
            Ok(client) => break client,
            Err(_) => thread::sleep(Duration::from_millis(10)),
        }
    };

    client.send_all(b"ping").unwrap();
    let mut buf = [0u8; 16];
    match client.receive(&mut buf) {
        RecvOutcome::Data(n) => assert_eq!(&buf[..n], b"ping"),
        other => panic!("unexpected outcome: {other:?}"),
    }

    let start = Instant::now();
    ipc::server_stop();
    runner.join().unwrap().unwrap();
    assert!(start.elapsed() <= Duration::from_millis(600));

    client.close();
    ipc::cleanup();
}
