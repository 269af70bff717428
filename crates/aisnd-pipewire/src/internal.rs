use std::cell::RefCell;
use std::rc::Rc;

use aisnd_core::driver::{CallbackResult, OutCallbackData, OutStreamDesc, SampleFormat};
use pipewire::channel::{Receiver, Sender};
use pipewire::context::Context;
use pipewire::core::Core;
use pipewire::keys::*;
use pipewire::main_loop::MainLoop;
use pipewire::properties::properties;
use pipewire::spa::param::audio::{AudioFormat, AudioInfoRaw, MAX_CHANNELS};
use pipewire::spa::pod::serialize::PodSerializer;
use pipewire::spa::pod::{Object, Pod, Value};
use pipewire::spa::sys::*;
use pipewire::spa::utils::Direction;
use pipewire::stream::{Stream, StreamFlags, StreamListener};
use slotmap::SlotMap;

use crate::{Error, Result};

/// Upper bound on the quantum requested from the graph, in frames.
const MAX_LATENCY_FRAMES: usize = 1024;

slotmap::new_key_type! {
    pub struct OutStreamId;
}

pub enum Message {
    CreateOutStream {
        sender: oneshot::Sender<Result<OutStreamId>>,
        desc: OutStreamDesc,
    },
    IsOutStreamActive {
        sender: oneshot::Sender<Result<bool>>,
        id: OutStreamId,
    },
    SetOutStreamActive {
        sender: oneshot::Sender<Result<()>>,
        id: OutStreamId,
        active: bool,
    },
    DestroyOutStream {
        sender: oneshot::Sender<Result<()>>,
        id: OutStreamId,
    },
    Terminate,
}

#[derive(Clone)]
pub struct Handle {
    sender: Sender<Message>,
}

impl Handle {
    pub fn new() -> (Handle, Receiver<Message>) {
        let (sender, receiver) = pipewire::channel::channel();
        (Handle { sender }, receiver)
    }

    fn send(&self, message: Message) -> Result<()> {
        self.sender.send(message).map_err(|_| Error::ThreadCrashed)
    }

    fn send_recv<T>(&self, recv: oneshot::Receiver<Result<T>>, message: Message) -> Result<T> {
        self.send(message)?;
        recv.recv().map_err(|_| Error::ThreadCrashed)?
    }

    pub fn terminate(&self) -> Result<()> {
        self.send(Message::Terminate)
    }

    pub fn create_out_stream(&self, desc: OutStreamDesc) -> Result<OutStreamId> {
        let (sender, receiver) = oneshot::channel();
        self.send_recv(receiver, Message::CreateOutStream { sender, desc })
    }

    pub fn is_out_stream_active(&self, id: OutStreamId) -> Result<bool> {
        let (sender, receiver) = oneshot::channel();
        self.send_recv(receiver, Message::IsOutStreamActive { sender, id })
    }

    pub fn set_out_stream_active(&self, id: OutStreamId, active: bool) -> Result<()> {
        let (sender, receiver) = oneshot::channel();
        self.send_recv(receiver, Message::SetOutStreamActive { sender, id, active })
    }

    /// Waits until the stream is gone, so its callback can no longer run.
    pub fn destroy_out_stream(&self, id: OutStreamId) -> Result<()> {
        let (sender, receiver) = oneshot::channel();
        self.send_recv(receiver, Message::DestroyOutStream { sender, id })
    }
}

pub struct PwThread {
    main_loop: MainLoop,
    core: Core,

    out_streams: RefCell<SlotMap<OutStreamId, OutStream>>,
}

struct OutStream {
    active: bool,
    stream: Stream,
    _listener: StreamListener<()>,
}

impl PwThread {
    pub fn new() -> Result<PwThread> {
        let main_loop = MainLoop::new(None)?;
        let context = Context::new(&main_loop)?;
        let core = context.connect(None)?;

        Ok(PwThread {
            main_loop,
            core,
            out_streams: Default::default(),
        })
    }

    pub fn run(self, receiver: Receiver<Message>) {
        let self_rc = Rc::new(self);

        let main_loop = self_rc.main_loop.clone();
        let _receiver = receiver.attach(main_loop.loop_(), move |msg| self_rc.handle_message(msg));

        main_loop.run();
    }

    fn handle_message(&self, message: Message) {
        match message {
            Message::CreateOutStream { sender, desc } => {
                let _ = sender.send(self.create_out_stream(desc));
            }
            Message::IsOutStreamActive { sender, id } => {
                let _ = sender.send(self.is_out_stream_active(id));
            }
            Message::SetOutStreamActive { sender, id, active } => {
                let _ = sender.send(self.set_out_stream_active(id, active));
            }
            Message::DestroyOutStream { sender, id } => {
                let _ = sender.send(self.destroy_out_stream(id));
            }
            Message::Terminate => self.terminate(),
        }
    }

    fn create_out_stream(&self, desc: OutStreamDesc) -> Result<OutStreamId> {
        let frame_size = desc.frame_size();
        let OutStreamDesc {
            name,
            sample_rate,
            channel_count,
            format,
            buffer_capacity_frames,
            mut callback,
            ..
        } = desc;

        let latency = buffer_capacity_frames.clamp(1, MAX_LATENCY_FRAMES);
        let max_bytes = buffer_capacity_frames * frame_size;

        let props = properties! {
            *MEDIA_TYPE => "Audio",
            *MEDIA_ROLE => "Game",
            *MEDIA_CATEGORY => "Playback",
            *AUDIO_CHANNELS => channel_count.to_string().as_bytes(),
            *NODE_LATENCY => format!("{latency}/{sample_rate}").as_bytes(),
        };

        let stream = Stream::new(&self.core, &name, props)?;

        let listener = stream
            .add_local_listener::<()>()
            .process(move |stream, _| {
                let Some(mut buffer) = stream.dequeue_buffer() else {
                    return;
                };

                // Interleaved format, everything lives in the first plane.
                let Some(data) = buffer.datas_mut().first_mut() else {
                    return;
                };

                let Some(bytes) = data.data() else {
                    return;
                };

                let len = bytes.len().min(max_bytes) / frame_size * frame_size;
                let bytes = &mut bytes[..len];

                let result = (callback)(OutCallbackData {
                    num_frames: len / frame_size,
                    bytes,
                });

                if result == CallbackResult::Stop {
                    tracing::trace!("pipewire streams are stopped from the control thread");
                }

                let chunk = data.chunk_mut();
                *chunk.offset_mut() = 0;
                *chunk.size_mut() = len as u32;
                *chunk.stride_mut() = frame_size as i32;
            })
            .register()?;

        let audio_info = serialize_audio_info(sample_rate, channel_count, format)?;
        let mut params = [Pod::from_bytes(&audio_info).ok_or(Error::InvalidPod)?];

        stream.connect(
            Direction::Output,
            None,
            StreamFlags::AUTOCONNECT
                | StreamFlags::MAP_BUFFERS
                | StreamFlags::RT_PROCESS
                | StreamFlags::INACTIVE,
            &mut params,
        )?;

        let out_stream = OutStream {
            active: false,
            stream,
            _listener: listener,
        };

        let id = self.out_streams.borrow_mut().insert(out_stream);

        tracing::debug!(?id, %name, sample_rate, "pipewire stream connected");

        Ok(id)
    }

    fn is_out_stream_active(&self, id: OutStreamId) -> Result<bool> {
        let out_streams = self.out_streams.borrow();
        let stream = out_streams.get(id).ok_or(Error::InvalidStreamId)?;
        Ok(stream.active)
    }

    fn set_out_stream_active(&self, id: OutStreamId, active: bool) -> Result<()> {
        let mut out_streams = self.out_streams.borrow_mut();
        let stream = out_streams.get_mut(id).ok_or(Error::InvalidStreamId)?;

        stream.stream.set_active(active)?;
        stream.active = active;

        Ok(())
    }

    fn destroy_out_stream(&self, id: OutStreamId) -> Result<()> {
        let stream = self
            .out_streams
            .borrow_mut()
            .remove(id)
            .ok_or(Error::InvalidStreamId)?;

        if let Err(error) = stream.stream.disconnect() {
            tracing::warn!(%error, "failed to disconnect pipewire stream");
        }

        Ok(())
    }

    fn terminate(&self) {
        self.out_streams.borrow_mut().clear();
        self.main_loop.quit();
    }
}

fn serialize_audio_info(
    sample_rate: u32,
    channel_count: u16,
    format: SampleFormat,
) -> Result<Vec<u8>> {
    let positions: &[u32] = match channel_count {
        1 => &[SPA_AUDIO_CHANNEL_MONO],
        2 => &[SPA_AUDIO_CHANNEL_FL, SPA_AUDIO_CHANNEL_FR],
        _ => return Err(Error::UnsupportedChannels(channel_count)),
    };

    let mut audio_info = AudioInfoRaw::new();
    audio_info.set_format(match format {
        SampleFormat::I16 => AudioFormat::S16LE,
        _ => AudioFormat::F32LE,
    });
    audio_info.set_rate(sample_rate);
    audio_info.set_channels(u32::from(channel_count));

    let mut position = [0; MAX_CHANNELS];
    position[..positions.len()].copy_from_slice(positions);
    audio_info.set_position(position);

    let values = PodSerializer::serialize(
        std::io::Cursor::new(Vec::new()),
        &Value::Object(Object {
            type_: SPA_TYPE_OBJECT_Format,
            id: SPA_PARAM_EnumFormat,
            properties: audio_info.into(),
        }),
    )?;

    Ok(values.0.into_inner())
}
