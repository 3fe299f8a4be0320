use rodio::{OutputStream, Sink, Source, source::SineWave};

/// Receives the "tone on" signal once per frame.
pub trait AudioSink {
    fn set_tone(&mut self, on: bool);
}

/// Continuous sine tone, paused whenever the sound timer is idle.
pub struct Beep {
    sink: Sink,
    // Dropping the stream silences the sink.
    _stream: OutputStream,
}

impl Beep {
    pub fn new(freq: f32) -> anyhow::Result<Self> {
        let (stream, stream_handle) = OutputStream::try_default()?;
        let sink = Sink::try_new(&stream_handle)?;
        let source = SineWave::new(freq).repeat_infinite();

        sink.append(source);
        sink.pause();

        Ok(Self {
            sink,
            _stream: stream,
        })
    }
}

impl AudioSink for Beep {
    fn set_tone(&mut self, on: bool) {
        if on {
            self.sink.play();
        } else {
            self.sink.pause();
        }
    }
}

pub struct Mute;

impl AudioSink for Mute {
    fn set_tone(&mut self, _on: bool) {}
}

impl<T: AudioSink + ?Sized> AudioSink for Box<T> {
    fn set_tone(&mut self, on: bool) {
        (**self).set_tone(on);
    }
}
