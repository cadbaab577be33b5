//! Ownership of the engine subprocess and its pipes.

use crate::error::EngineError;
use crossbeam_channel::{unbounded, Receiver};
use log::{debug, info, trace, warn};
use std::fmt;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// How long the engine gets to honour `quit` before it is killed.
pub const QUIT_GRACE: Duration = Duration::from_millis(500);

/// Executable plus arguments used to launch an engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineCommand {
   pub path: PathBuf,
   pub args: Vec<String>,
}

impl EngineCommand {
   pub fn new(path: impl Into<PathBuf>) -> EngineCommand {
      EngineCommand {
         path: path.into(),
         args: Vec::new(),
      }
   }

   pub fn arg(mut self, arg: impl Into<String>) -> EngineCommand {
      self.args.push(arg.into());
      self
   }
}

impl fmt::Display for EngineCommand {
   fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
      write!(f, "{}", self.path.display())?;
      for arg in self.args.iter() {
         write!(f, " {}", arg)?;
      }
      Ok(())
   }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProcessEvent {
   Line(String),
   /// stdout reached EOF or failed; the process is gone or going.
   Exited,
}

pub struct EngineProcess {
   child: Child,
   stdin: BufWriter<ChildStdin>,
   events: Receiver<ProcessEvent>,
   terminated: bool,
}

impl EngineProcess {
   pub fn start(command: &EngineCommand) -> Result<EngineProcess, EngineError> {
      let path = command.path.clone();
      let launch_err = |source: io::Error| EngineError::Launch {
         path: path.clone(),
         source,
      };
      let mut child = Command::new(&path)
         .args(&command.args)
         .stdin(Stdio::piped())
         .stdout(Stdio::piped())
         .stderr(Stdio::null())
         .spawn()
         .map_err(launch_err)?;

      let pipes = child.stdin.take().zip(child.stdout.take());
      let (stdin, stdout) = match pipes {
         Some(pipes) => pipes,
         None => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(launch_err(io::Error::new(io::ErrorKind::BrokenPipe, "engine pipes unavailable")));
         }
      };

      let (tx, rx) = unbounded();
      let reader = thread::Builder::new().name("engine-stdout".into()).spawn(move || {
         let reader = BufReader::new(stdout);
         for line in reader.lines() {
            match line {
               Ok(l) => {
                  let l = l.trim_end().to_owned();
                  trace!("<< {}", l);
                  if tx.send(ProcessEvent::Line(l)).is_err() {
                     return;
                  }
               }
               Err(e) => {
                  debug!("engine stdout read failed: {}", e);
                  break;
               }
            }
         }
         let _ = tx.send(ProcessEvent::Exited);
      });
      if let Err(e) = reader {
         let _ = child.kill();
         let _ = child.wait();
         return Err(launch_err(e));
      }

      info!("started engine {} (pid {})", path.display(), child.id());
      Ok(EngineProcess {
         child,
         stdin: BufWriter::new(stdin),
         events: rx,
         terminated: false,
      })
   }

   /// Lines from the engine's stdout, in order, followed by a single `Exited`.
   pub fn events(&self) -> &Receiver<ProcessEvent> {
      &self.events
   }

   pub fn write_line(&mut self, line: &str) -> Result<(), EngineError> {
      trace!(">> {}", line);
      writeln!(self.stdin, "{}", line)
         .and_then(|_| self.stdin.flush())
         .map_err(|e| EngineError::crashed(format!("writing {:?} failed: {}", line, e)))
   }

   /// Sends `quit`, waits up to [`QUIT_GRACE`], then kills. Safe to call repeatedly.
   pub fn terminate(&mut self) {
      if self.terminated {
         return;
      }
      self.terminated = true;

      let _ = self.write_line("quit");
      let deadline = Instant::now() + QUIT_GRACE;
      loop {
         match self.child.try_wait() {
            Ok(Some(status)) => {
               debug!("engine {} exited with {}", self.child.id(), status);
               return;
            }
            Ok(None) if Instant::now() < deadline => thread::sleep(Duration::from_millis(10)),
            Ok(None) => break,
            Err(e) => {
               warn!("could not poll engine {}: {}", self.child.id(), e);
               break;
            }
         }
      }

      warn!("engine {} ignored quit, killing it", self.child.id());
      let _ = self.child.kill();
      let _ = self.child.wait();
   }
}

impl Drop for EngineProcess {
   fn drop(&mut self) {
      self.terminate();
   }
}
