extern crate coio_promise;
extern crate env_logger;

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::mpsc;
use std::thread;

use coio_promise::{context, invoke, Call, Error};

#[derive(Debug, Clone)]
enum EchoFault {
    Empty,
    Io(String),
    Scheduler(Error),
}

impl From<Error> for EchoFault {
    fn from(err: Error) -> EchoFault {
        EchoFault::Scheduler(err)
    }
}

impl From<io::Error> for EchoFault {
    fn from(err: io::Error) -> EchoFault {
        EchoFault::Io(err.to_string())
    }
}

struct Echo {
    addr: SocketAddr,
    message: &'static str,
}

impl Call for Echo {
    type Value = String;
    type Failure = String;
    type Request = Vec<u8>;
    type Response = Vec<u8>;
    type Fault = EchoFault;

    fn build(&self) -> Result<Vec<u8>, EchoFault> {
        if self.message.is_empty() {
            return Err(EchoFault::Empty);
        }
        Ok(self.message.as_bytes().to_vec())
    }

    fn send(&self, request: Vec<u8>) -> Result<Vec<u8>, EchoFault> {
        let mut stream = TcpStream::connect(self.addr)?;
        stream.write_all(&request)?;
        stream.shutdown(Shutdown::Write)?;

        let mut buf = vec![0u8; request.len()];
        stream.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn receive(&self, response: Vec<u8>) -> Result<String, EchoFault> {
        String::from_utf8(response).map_err(|err| EchoFault::Io(err.to_string()))
    }

    fn handle(&self, fault: EchoFault) -> String {
        match fault {
            EchoFault::Empty => "nothing to send".to_owned(),
            EchoFault::Io(..) => "connection failed".to_owned(),
            EchoFault::Scheduler(err) => err.to_string(),
        }
    }
}

fn echo_server(connections: usize) -> SocketAddr {
    let acceptor = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = acceptor.local_addr().unwrap();

    thread::spawn(move || {
        for stream in acceptor.incoming().take(connections) {
            let mut stream = stream.unwrap();
            let mut buf = [0u8; 1024];
            while let Ok(len) = stream.read(&mut buf) {
                if len == 0 {
                    // EOF
                    break;
                }
                stream.write_all(&buf[..len]).unwrap();
            }
        }
    });

    addr
}

// An address nothing listens on
fn closed_addr() -> SocketAddr {
    let acceptor = TcpListener::bind("127.0.0.1:0").unwrap();
    acceptor.local_addr().unwrap()
}

#[test]
fn test_tcp_echo_call() {
    let _ = env_logger::try_init();

    let addr = echo_server(2);
    let (tx, rx) = mpsc::channel();

    context::call(|| {
        for &message in ["hello", "world"].iter() {
            let tx = tx.clone();
            invoke(Echo {
                    addr: addr,
                    message: message,
                })
                .on_value(move |echoed| tx.send((echoed, thread::current().id())).unwrap());
        }
    });

    let mut echoed = rx.try_iter().collect::<Vec<_>>();
    echoed.sort_by(|a, b| a.0.cmp(&b.0));
    assert_eq!(echoed,
               vec![("hello".to_owned(), thread::current().id()), ("world".to_owned(), thread::current().id())]);
}

#[test]
fn test_refused_connection_rejects() {
    let _ = env_logger::try_init();

    let addr = closed_addr();
    let (tx, rx) = mpsc::channel();

    context::call(|| {
        let value_tx = tx.clone();
        invoke(Echo {
                addr: addr,
                message: "hello",
            })
            .on_settled(move |v| value_tx.send(Ok(v)).unwrap(),
                        move |e| tx.send(Err(e)).unwrap());
    });

    assert_eq!(rx.try_iter().collect::<Vec<_>>(),
               vec![Err("connection failed".to_owned())]);
}

#[test]
fn test_empty_message_rejected_at_build() {
    let _ = env_logger::try_init();

    let (tx, rx) = mpsc::channel();

    context::call(|| {
        invoke(Echo {
                addr: closed_addr(),
                message: "",
            })
            .on_error(move |e| tx.send(e).unwrap());
    });

    assert_eq!(rx.try_recv().unwrap(), "nothing to send");
}

#[test]
fn test_call_outside_loop_rejects() {
    let _ = env_logger::try_init();

    let (tx, rx) = mpsc::channel();

    invoke(Echo {
            addr: closed_addr(),
            message: "hello",
        })
        .on_error(move |e| tx.send(e).unwrap());

    assert_eq!(rx.try_recv().unwrap(), Error::SchedulerNotActive.to_string());
    context::reset();
}
