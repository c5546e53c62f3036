/*!
Analyzer driver.

[`Analyzer`] is the capability set a host needs: plan offsets, run a pass,
synthesize a capture and decide on an autobaud rerun. [`AsyncSerialAnalyzer`]
implements it for every protocol variant; the variant is just its
[`Settings`] value. [`AsyncSerialAnalyzer::analyze`] ties the pieces together
for one capture.
*/

use tracing::{info, warn};

use crate::autobaud::AutobaudEstimator;
use crate::decoder::{FrameDecoder, PassReport};
use crate::encoder;
use crate::error::Result;
use crate::frame::{CancelToken, FrameLog, FrameSink};
use crate::plan::SampleOffsetPlan;
use crate::settings::Settings;
use crate::waveform::{EdgeCursor, Waveform};

/// What a host can ask of a protocol analyzer
pub trait Analyzer {
    fn settings(&self) -> &Settings;

    /// Sampling offsets for the current settings at `sample_rate`
    fn compute_sample_offsets(&self, sample_rate: u32) -> Result<SampleOffsetPlan>;

    /// Decode one full pass into `sink`
    fn run_decode_pass<C, S>(
        &self,
        plan: &SampleOffsetPlan,
        sample_rate: u32,
        cursor: &mut C,
        sink: &mut S,
        cancel: &CancelToken,
    ) -> Result<PassReport>
    where
        C: EdgeCursor,
        S: FrameSink;

    /// A capture of at least `samples` samples carrying a counting pattern
    fn generate_simulation_waveform(&self, sample_rate: u32, samples: u64) -> Result<Waveform>;

    /// Feed a finished pass to autobaud. Returns true if the settings changed
    /// and the capture should be decoded again.
    fn estimate_rerun(&mut self, report: &PassReport, sample_rate: u32) -> Result<bool>;
}

/// Result of analyzing one capture
#[derive(Debug, Clone)]
pub struct Analysis {
    pub log: FrameLog,
    /// Report of the pass that produced `log`
    pub report: PassReport,
    pub reran: bool,
    /// Bit rate `log` was decoded with
    pub bit_rate: u32,
}

/// Standard async serial, multiprocessor and Qi analyzer
#[derive(Debug, Clone, Default)]
pub struct AsyncSerialAnalyzer {
    settings: Settings,
}

impl AsyncSerialAnalyzer {
    pub fn new(settings: Settings) -> Result<Self> {
        settings.validate()?;
        Ok(Self { settings })
    }

    /// Decode a capture, rerunning once if autobaud finds a better bit rate
    pub fn analyze(&mut self, waveform: &Waveform, cancel: &CancelToken) -> Result<Analysis> {
        let sample_rate = waveform.sample_rate();
        if u64::from(sample_rate) < self.settings.minimum_sample_rate() {
            warn!(
                "Sample rate {} Hz is below the suggested {} Hz for {} bit/s",
                sample_rate,
                self.settings.minimum_sample_rate(),
                self.settings.bit_rate
            );
        }

        let (mut log, mut report) = self.decode_once(waveform, cancel)?;
        let mut reran = false;

        // a capture without a single complete pulse fails here as an invariant error
        if !report.cancelled && self.estimate_rerun(&report, sample_rate)? {
            info!("Decoding again at {} bit/s", self.settings.bit_rate);
            (log, report) = self.decode_once(waveform, cancel)?;
            reran = true;
        }

        Ok(Analysis {
            log,
            report,
            reran,
            bit_rate: self.settings.bit_rate,
        })
    }

    fn decode_once(&self, waveform: &Waveform, cancel: &CancelToken) -> Result<(FrameLog, PassReport)> {
        let sample_rate = waveform.sample_rate();
        let plan = self.compute_sample_offsets(sample_rate)?;
        let mut log = FrameLog::new();
        let report = self.run_decode_pass(&plan, sample_rate, &mut waveform.cursor(), &mut log, cancel)?;
        Ok((log, report))
    }
}

impl Analyzer for AsyncSerialAnalyzer {
    fn settings(&self) -> &Settings {
        &self.settings
    }

    fn compute_sample_offsets(&self, sample_rate: u32) -> Result<SampleOffsetPlan> {
        self.settings.validate()?;
        Ok(SampleOffsetPlan::compute(&self.settings, sample_rate))
    }

    fn run_decode_pass<C, S>(
        &self,
        plan: &SampleOffsetPlan,
        sample_rate: u32,
        cursor: &mut C,
        sink: &mut S,
        cancel: &CancelToken,
    ) -> Result<PassReport>
    where
        C: EdgeCursor,
        S: FrameSink,
    {
        let decoder = FrameDecoder::new(&self.settings, plan, sample_rate)?;
        Ok(decoder.run(cursor, sink, cancel))
    }

    fn generate_simulation_waveform(&self, sample_rate: u32, samples: u64) -> Result<Waveform> {
        encoder::simulate(&self.settings, sample_rate, samples)
    }

    fn estimate_rerun(&mut self, report: &PassReport, sample_rate: u32) -> Result<bool> {
        if !self.settings.use_autobaud {
            return Ok(false);
        }
        let decision = AutobaudEstimator::new(sample_rate).evaluate(&mut self.settings, report.minimum_pulse_width)?;
        Ok(decision.rerun)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::{Transfer, WaveformEncoder};
    use crate::frame::Frame;
    use crate::settings::{BandPolicy, LineCoding, Mode, Parity, ShiftOrder, StopBits};

    const NRZ_SAMPLE_RATE: u32 = 1_000_000;

    fn decode(settings: Settings, waveform: &Waveform) -> Analysis {
        AsyncSerialAnalyzer::new(settings)
            .unwrap()
            .analyze(waveform, &CancelToken::new())
            .unwrap()
    }

    fn encode(settings: &Settings, sample_rate: u32, transfers: &[Transfer]) -> Waveform {
        let mut encoder = WaveformEncoder::new(settings, sample_rate).unwrap();
        match settings.line_coding {
            LineCoding::Nrz => {
                for &transfer in transfers {
                    encoder.write_transfer(transfer);
                    encoder.idle(2);
                }
            }
            LineCoding::Biphase => encoder.write_packet(transfers),
        }
        encoder.idle(10);
        encoder.finish()
    }

    fn assert_frames_ordered(frames: &[Frame]) {
        for frame in frames {
            assert!(frame.start_sample <= frame.end_sample);
        }
        for pair in frames.windows(2) {
            assert!(pair[0].end_sample < pair[1].start_sample);
        }
    }

    fn test_values(settings: &Settings) -> Vec<Transfer> {
        let mask = settings.value_mask();
        let mut transfers: Vec<Transfer> = [0, mask, 0x5555_5555_5555_5555 & mask, 0xAAAA_AAAA_AAAA_AAAA & mask, 1]
            .into_iter()
            .map(Transfer::data)
            .collect();
        if settings.mode.has_marker() {
            transfers.insert(0, Transfer::address(0x3C & mask));
        }
        transfers
    }

    fn variants(line_coding: LineCoding, bit_rate: u32) -> Vec<Settings> {
        let mut all = Vec::new();
        let layouts = [
            (Mode::Normal, Parity::None),
            (Mode::Normal, Parity::Even),
            (Mode::Normal, Parity::Odd),
            (Mode::MpMsbZeroMeansAddress, Parity::None),
            (Mode::MpMsbOneMeansAddress, Parity::None),
        ];
        for bits_per_transfer in [1, 7, 8, 9, 16, 64] {
            for shift_order in [ShiftOrder::LsbFirst, ShiftOrder::MsbFirst] {
                for (mode, parity) in layouts {
                    for stop_bits in [StopBits::One, StopBits::OneAndHalf, StopBits::Two] {
                        for inverted in [false, true] {
                            all.push(Settings {
                                bit_rate,
                                bits_per_transfer,
                                shift_order,
                                stop_bits,
                                parity,
                                inverted,
                                mode,
                                line_coding,
                                ..Settings::serial()
                            });
                        }
                    }
                }
            }
        }
        all
    }

    fn assert_round_trip(settings: Settings, sample_rate: u32) {
        let transfers = test_values(&settings);
        let waveform = encode(&settings, sample_rate, &transfers);
        let label = format!("{:?}", settings);
        let analysis = decode(settings, &waveform);
        let frames = analysis.log.frames();

        assert_eq!(frames.len(), transfers.len(), "{}", label);
        for (frame, transfer) in frames.iter().zip(&transfers) {
            assert_eq!(frame.value, transfer.value, "{}", label);
            assert_eq!(frame.is_address(), transfer.address, "{}", label);
            assert!(!frame.has_error(), "{}", label);
        }
        assert_frames_ordered(frames);
    }

    #[test]
    fn test_nrz_round_trip_all_layouts() {
        for settings in variants(LineCoding::Nrz, 9600) {
            assert_round_trip(settings, NRZ_SAMPLE_RATE);
        }
    }

    #[test]
    fn test_biphase_round_trip_all_layouts() {
        // 500 samples per bit keeps scaled bands wide enough for rounding
        for settings in variants(LineCoding::Biphase, 2000) {
            assert_round_trip(settings, 1_000_000);
        }
    }

    #[test]
    fn test_biphase_round_trip_at_few_samples_per_bit() {
        // 4, 8, 13 and 21 samples per bit
        for sample_rate in [8_000, 16_000, 26_000, 42_000] {
            assert_round_trip(Settings::qi(), sample_rate);
            assert_round_trip(
                Settings {
                    shift_order: ShiftOrder::MsbFirst,
                    parity: Parity::Odd,
                    stop_bits: StopBits::Two,
                    ..Settings::qi()
                },
                sample_rate,
            );
        }
    }

    #[test]
    fn test_biphase_longest_preamble_round_trip() {
        let settings = Settings {
            preamble_bits: crate::decoder::MAX_PREAMBLE_CELLS - 1,
            ..Settings::qi()
        };
        let transfers: Vec<Transfer> = [0x12, 0x34].into_iter().map(Transfer::from).collect();
        let waveform = encode(&settings, 1_000_000, &transfers);
        let analysis = decode(settings, &waveform);
        let values: Vec<u64> = analysis.log.frames().iter().map(|f| f.value).collect();
        assert_eq!(values, vec![0x12, 0x34]);
    }

    #[test]
    fn test_biphase_fixed_bands_at_qi_capture_rate() {
        let settings = Settings { pulse_bands: BandPolicy::Fixed, ..Settings::qi() };
        let transfers: Vec<Transfer> = [0x01, 0x02, 0x80, 0xFE].into_iter().map(Transfer::from).collect();
        let waveform = encode(&settings, 100_000_000, &transfers);
        let analysis = decode(settings, &waveform);
        let values: Vec<u64> = analysis.log.frames().iter().map(|f| f.value).collect();
        assert_eq!(values, vec![0x01, 0x02, 0x80, 0xFE]);
    }

    #[test]
    fn test_9600_8n1_scenario() {
        let settings = Settings::serial();
        let transfers: Vec<Transfer> = [0x00, 0xFF, 0x55, 0xAA].into_iter().map(Transfer::from).collect();
        let waveform = encode(&settings, NRZ_SAMPLE_RATE, &transfers);
        let analysis = decode(settings, &waveform);

        let frames = analysis.log.frames();
        let values: Vec<u64> = frames.iter().map(|f| f.value).collect();
        assert_eq!(values, vec![0x00, 0xFF, 0x55, 0xAA]);
        assert!(frames.iter().all(|f| f.flags == Default::default()));
        assert_frames_ordered(frames);
        assert!(!analysis.reran);
    }

    #[test]
    fn test_autobaud_corrects_wrong_bit_rate() {
        let sent = Settings::serial();
        let transfers: Vec<Transfer> = [0x55, 0xAA, 0x12, 0x34].into_iter().map(Transfer::from).collect();
        let waveform = encode(&sent, NRZ_SAMPLE_RATE, &transfers);

        let configured = Settings { bit_rate: 12_000, use_autobaud: true, ..Settings::serial() };
        let analysis = decode(configured, &waveform);

        assert!(analysis.reran);
        assert!((9_500..=9_700).contains(&analysis.bit_rate), "bit rate {}", analysis.bit_rate);
        let values: Vec<u64> = analysis.log.frames().iter().map(|f| f.value).collect();
        assert_eq!(values, vec![0x55, 0xAA, 0x12, 0x34]);
    }

    #[test]
    fn test_autobaud_keeps_close_bit_rate() {
        let settings = Settings { use_autobaud: true, ..Settings::serial() };
        let transfers: Vec<Transfer> = [0x55].into_iter().map(Transfer::from).collect();
        let waveform = encode(&settings, NRZ_SAMPLE_RATE, &transfers);
        let analysis = decode(settings, &waveform);
        assert!(!analysis.reran);
        assert_eq!(analysis.bit_rate, 9600);
    }

    #[test]
    fn test_cancelled_pass_never_reruns() {
        let sent = Settings::serial();
        let transfers: Vec<Transfer> = [1, 2, 3].into_iter().map(Transfer::from).collect();
        let waveform = encode(&sent, NRZ_SAMPLE_RATE, &transfers);

        let configured = Settings { bit_rate: 12_000, use_autobaud: true, ..Settings::serial() };
        let mut analyzer = AsyncSerialAnalyzer::new(configured).unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();
        let analysis = analyzer.analyze(&waveform, &cancel).unwrap();

        assert!(analysis.report.cancelled);
        assert!(!analysis.reran);
        assert_eq!(analysis.log.frames().len(), 1);
        assert_eq!(analyzer.settings().bit_rate, 12_000);
    }

    #[test]
    fn test_edgeless_capture_with_autobaud_is_invariant_failure() {
        let waveform = Waveform::new(NRZ_SAMPLE_RATE, crate::bits::BitLevel::High, vec![], 1000).unwrap();

        let analysis = decode(Settings::serial(), &waveform);
        assert!(analysis.log.frames().is_empty());

        let mut analyzer = AsyncSerialAnalyzer::new(Settings { use_autobaud: true, ..Settings::serial() }).unwrap();
        let err = analyzer.analyze(&waveform, &CancelToken::new()).unwrap_err();
        assert!(err.is_invariant());
    }

    #[test]
    fn test_zero_pulse_estimate_is_fatal() {
        let mut analyzer = AsyncSerialAnalyzer::new(Settings { use_autobaud: true, ..Settings::serial() }).unwrap();
        let err = analyzer.estimate_rerun(&PassReport::default(), NRZ_SAMPLE_RATE).unwrap_err();
        assert!(err.is_invariant());
    }

    #[test]
    fn test_rejects_parity_with_multiprocessor_mode() {
        let settings = Settings {
            parity: Parity::Even,
            mode: Mode::MpMsbOneMeansAddress,
            ..Settings::serial()
        };
        let err = AsyncSerialAnalyzer::new(settings).unwrap_err();
        assert!(err.to_string().contains("parity cannot be combined with multiprocessor mode"));
    }

    #[test]
    fn test_simulation_decodes_to_counting_sequence() {
        let analyzer = AsyncSerialAnalyzer::new(Settings::serial()).unwrap();
        let waveform = analyzer.generate_simulation_waveform(NRZ_SAMPLE_RATE, 100_000).unwrap();
        let analysis = decode(Settings::serial(), &waveform);

        let values: Vec<u64> = analysis.log.frames().iter().map(|f| f.value).collect();
        assert!(values.len() > 10);
        let expected: Vec<u64> = (0..values.len() as u64).map(|v| v & 0xFF).collect();
        assert_eq!(values, expected);
    }

    #[test]
    fn test_multiprocessor_simulation_forms_packets() {
        let settings = Settings { mode: Mode::MpMsbOneMeansAddress, ..Settings::serial() };
        let analyzer = AsyncSerialAnalyzer::new(settings.clone()).unwrap();
        let waveform = analyzer.generate_simulation_waveform(NRZ_SAMPLE_RATE, 100_000).unwrap();
        let analysis = decode(settings, &waveform);

        let packets = analysis.log.packets();
        assert!(packets.len() >= 2);
        let mut counter = 0;
        for (index, packet) in packets.iter().enumerate() {
            assert_eq!(packet.len(), 5);
            assert!(packet[0].is_address());
            assert_eq!(packet[0].value, if index % 2 == 0 { 1 } else { 2 });
            for frame in &packet[1..] {
                assert!(!frame.is_address());
                assert_eq!(frame.value, counter);
                counter += 1;
            }
        }
    }

    #[test]
    fn test_biphase_simulation_decodes_to_counting_sequence() {
        let settings = Settings::qi();
        let analyzer = AsyncSerialAnalyzer::new(settings.clone()).unwrap();
        let waveform = analyzer.generate_simulation_waveform(1_000_000, 200_000).unwrap();
        let analysis = decode(settings, &waveform);

        let values: Vec<u64> = analysis.log.frames().iter().map(|f| f.value).collect();
        assert!(values.len() >= 8);
        assert_eq!(values.len() % 4, 0);
        let expected: Vec<u64> = (0..values.len() as u64).collect();
        assert_eq!(values, expected);
        assert_eq!(analysis.report.frames_abandoned, 0);
    }
}
