//! Interactive demo session.
//!
//! A [`Session`] reads menu choices and names line by line from its input
//! and writes everything it shows to its output. The menu loop runs until
//! the user picks exit or the input ends.

use std::io::{self, Write};

use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use tonic::Status;

use super::{CallOptions, GreeterClient};
use crate::error::GreeterError;
use crate::metadata::Metadata;
use crate::proto::GreetRequest;
use crate::{Result, status};

/// Menu printed before every prompt.
pub const MENU: &str = "1: Greet\n2: GreetStream\n3: CollectGreet\n4: GreetChat\n5: exit";

const PROMPT: &str = "please enter >";

/// Names sent by the client-streaming and bidi options unless configured.
pub const DEFAULT_SEND_COUNT: usize = 5;

/// An entry of the menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuChoice {
    Greet,
    GreetStream,
    CollectGreet,
    GreetChat,
    Exit,
}

impl MenuChoice {
    /// Parse a menu line. Surrounding whitespace is ignored.
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim() {
            "1" => Some(MenuChoice::Greet),
            "2" => Some(MenuChoice::GreetStream),
            "3" => Some(MenuChoice::CollectGreet),
            "4" => Some(MenuChoice::GreetChat),
            "5" => Some(MenuChoice::Exit),
            _ => None,
        }
    }
}

/// Whether the menu loop keeps going.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// Outcome of the bidi send loop.
enum Sent {
    All,
    InputEnded,
    Failed(Status),
}

/// Menu-driven client session over `input` and `output`.
pub struct Session<R, W> {
    input: Lines<R>,
    output: W,
    client: GreeterClient,
    send_count: usize,
}

impl<R, W> Session<R, W>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    pub fn new(input: R, output: W, client: GreeterClient) -> Self {
        Self {
            input: input.lines(),
            output,
            client,
            send_count: DEFAULT_SEND_COUNT,
        }
    }

    /// Names to ask for in CollectGreet and GreetChat.
    pub fn send_count(mut self, count: usize) -> Self {
        self.send_count = count;
        self
    }

    pub fn into_output(self) -> W {
        self.output
    }

    /// Run the menu loop until exit or end of input.
    pub async fn run(&mut self) -> Result<()> {
        writeln!(self.output, "start gRPC client.")?;
        while self.step().await? == Flow::Continue {}
        writeln!(self.output, "bye.")?;
        self.output.flush()?;
        Ok(())
    }

    /// Show the menu once and handle one choice.
    pub async fn step(&mut self) -> Result<Flow> {
        writeln!(self.output, "{MENU}")?;
        write!(self.output, "{PROMPT}")?;
        self.output.flush()?;

        let Some(line) = self.input.next_line().await? else {
            return Ok(Flow::Exit);
        };
        match MenuChoice::parse(&line) {
            Some(MenuChoice::Greet) => self.greet().await,
            Some(MenuChoice::GreetStream) => self.greet_stream().await,
            Some(MenuChoice::CollectGreet) => self.collect_greet().await,
            Some(MenuChoice::GreetChat) => self.greet_chat().await,
            Some(MenuChoice::Exit) => Ok(Flow::Exit),
            None => Ok(Flow::Continue),
        }
    }

    async fn greet(&mut self) -> Result<Flow> {
        writeln!(self.output, "Please enter your name.")?;
        let Some(name) = self.input.next_line().await? else {
            return Ok(Flow::Exit);
        };

        match self
            .client
            .greet(options("unary"), GreetRequest::new(name))
            .await
        {
            Ok(response) => {
                writeln!(self.output, "{}", response.header)?;
                writeln!(self.output, "{}", response.trailer)?;
                writeln!(self.output, "{}", response.message.message)?;
            }
            Err(status) => print_status(&mut self.output, &status)?,
        }
        Ok(Flow::Continue)
    }

    async fn greet_stream(&mut self) -> Result<Flow> {
        writeln!(self.output, "Please enter your name.")?;
        let Some(name) = self.input.next_line().await? else {
            return Ok(Flow::Exit);
        };

        let call = match self
            .client
            .greet_stream(options("stream"), GreetRequest::new(name))
            .await
        {
            Ok(call) => call,
            Err(status) => {
                print_status(&mut self.output, &status)?;
                return Ok(Flow::Continue);
            }
        };

        loop {
            match call.message().await {
                Ok(Some(response)) => writeln!(self.output, "{}", response.message)?,
                Ok(None) => {
                    writeln!(self.output, "all the responses have already received")?;
                    break;
                }
                Err(status) => {
                    print_status(&mut self.output, &status)?;
                    break;
                }
            }
        }
        Ok(Flow::Continue)
    }

    async fn collect_greet(&mut self) -> Result<Flow> {
        let call = match self.client.collect_greet(options("stream")).await {
            Ok(call) => call,
            Err(status) => {
                print_status(&mut self.output, &status)?;
                return Ok(Flow::Continue);
            }
        };

        writeln!(self.output, "Please enter {} names.", self.send_count)?;
        for _ in 0..self.send_count {
            let Some(name) = self.input.next_line().await? else {
                call.cancel();
                return Ok(Flow::Exit);
            };
            if let Err(status) = call.send(GreetRequest::new(name)).await {
                print_status(&mut self.output, &status)?;
                return Ok(Flow::Continue);
            }
        }

        match call.close_and_recv().await {
            Ok(response) => writeln!(self.output, "{}", response.message.message)?,
            Err(status) => print_status(&mut self.output, &status)?,
        }
        Ok(Flow::Continue)
    }

    async fn greet_chat(&mut self) -> Result<Flow> {
        let call = match self.client.greet_chat(options("stream")).await {
            Ok(call) => call,
            Err(status) => {
                print_status(&mut self.output, &status)?;
                return Ok(Flow::Continue);
            }
        };
        writeln!(self.output, "Please enter {} names.", self.send_count)?;

        let count = self.send_count;
        let input = &mut self.input;
        let output = &mut self.output;
        let call = &call;

        let send = async move {
            let mut sent = Sent::All;
            for _ in 0..count {
                let Some(name) = input.next_line().await? else {
                    sent = Sent::InputEnded;
                    break;
                };
                if let Err(status) = call.send(GreetRequest::new(name)).await {
                    sent = Sent::Failed(status);
                    break;
                }
            }
            call.close_send().await.map_err(io::Error::other)?;
            Ok::<Sent, io::Error>(sent)
        };
        let receive = async move {
            match call.header().await {
                Ok(header) => writeln!(output, "{header}")?,
                Err(status) => {
                    print_status(&mut *output, &status)?;
                    return Ok(output);
                }
            }
            loop {
                match call.message().await {
                    Ok(Some(response)) => writeln!(output, "{}", response.message)?,
                    Ok(None) => break,
                    Err(status) => {
                        print_status(&mut *output, &status)?;
                        break;
                    }
                }
            }
            Ok::<&mut W, io::Error>(output)
        };

        let (sent, received) = tokio::join!(send, receive);
        let output = received?;
        writeln!(output, "{}", call.trailer().unwrap_or_default())?;
        match sent? {
            Sent::All => Ok(Flow::Continue),
            Sent::InputEnded => Ok(Flow::Exit),
            Sent::Failed(status) => {
                print_status(&mut *output, &status)?;
                Ok(Flow::Continue)
            }
        }
    }
}

/// Outgoing metadata sent with every demo call.
fn options(kind: &str) -> CallOptions {
    CallOptions::new().metadata(Metadata::from_pairs([("type", kind), ("from", "client")]))
}

/// Print a failed call: the error line, then code, message and details.
fn print_status<W: Write>(output: &mut W, status: &Status) -> io::Result<()> {
    writeln!(output, "{}", GreeterError::from(status.clone()))?;
    writeln!(output, "{}", status::describe(status))
}
