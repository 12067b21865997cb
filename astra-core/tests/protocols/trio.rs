use std::path::Path;
use std::thread;

use astra_core::protocols::astra::input::{OnlineInput, PrepInput};
use astra_core::protocols::astra::mc;
use astra_core::protocols::astra::options::AstraOptions;
use astra_core::protocols::astra::preprocessing::BufferPrep;
use astra_core::protocols::astra::ring::ring_impl::RingElement;
use astra_core::protocols::astra::share::{OnlineShare, Share2k};
use astra_core::protocols::astra::trunc::TruncPrTuple;
use astra_core::protocols::trio::{utils, Trio, TrioPrep, TrioPrepShare, TrioShare};
use astra_net::local::LocalNetwork;
use astra_net::Network;

fn r(v: u64) -> RingElement<u64> {
    RingElement(v)
}

fn run_prep<F>(dir: &Path, f: F)
where
    F: Fn(&mut TrioPrep<u64, LocalNetwork>) + Send + Sync + 'static + Clone,
{
    let nets = LocalNetwork::new(3);
    let handles: Vec<_> = nets
        .into_iter()
        .map(|net| {
            let options = AstraOptions::with_prep_dir(dir);
            let seed = [net.id() as u8 + 7; 32];
            let f = f.clone();
            thread::spawn(move || {
                let mut prep = TrioPrep::<u64, _>::with_seed(net, options, seed).unwrap();
                f(&mut prep);
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
}

fn run_online<F, R>(dir: &Path, f: F) -> Vec<R>
where
    F: Fn(&mut Trio<u64, LocalNetwork>) -> R + Send + Sync + 'static + Clone,
    R: Send + 'static,
{
    let nets = LocalNetwork::new(2);
    let handles: Vec<_> = nets
        .into_iter()
        .map(|net| {
            let options = AstraOptions::with_prep_dir(dir);
            let f = f.clone();
            thread::spawn(move || {
                let mut engine = Trio::<u64, _>::new(net, options).unwrap();
                f(&mut engine)
            })
        })
        .collect();
    handles.into_iter().map(|h| h.join().unwrap()).collect()
}

fn prep_two_inputs(
    prep: &mut TrioPrep<u64, LocalNetwork>,
) -> (TrioPrepShare<u64>, TrioPrepShare<u64>) {
    let mut input = PrepInput::new(prep);
    input.reset_all();
    if prep.my_num() == 1 {
        input.add_mine();
    } else {
        input.add_other(0);
    }
    if prep.my_num() == 2 {
        input.add_mine();
    } else {
        input.add_other(1);
    }
    input.exchange(prep).unwrap();
    (input.finalize(0), input.finalize(1))
}

fn online_two_inputs(
    engine: &mut Trio<u64, LocalNetwork>,
    x: u64,
    y: u64,
) -> (TrioShare<u64>, TrioShare<u64>) {
    let mut input = OnlineInput::new(engine);
    input.reset_all();
    if engine.my_num() == 1 {
        input.add_mine(r(x));
    } else {
        input.add_other(0);
    }
    if engine.my_num() == 2 {
        input.add_mine(r(y));
    } else {
        input.add_other(1);
    }
    input.exchange(engine).unwrap();
    (input.finalize(0), input.finalize(1))
}

#[test]
fn constants_and_linearity() {
    let nets = LocalNetwork::new(2);
    let handles: Vec<_> = nets
        .into_iter()
        .map(|net| {
            thread::spawn(move || {
                let x = <TrioShare<u64> as OnlineShare<u64>>::constant(r(5));
                let y = <TrioShare<u64> as OnlineShare<u64>>::constant(r(3));
                mc::open_many(&net, &[x, x + y, x - y, x * r(4)]).unwrap()
            })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), vec![r(5), r(8), r(2), r(20)]);
    }
}

#[test]
fn share_and_combine() {
    let mut rng = rand::thread_rng();
    let shares = utils::share_ring_element(r(42), &mut rng);
    assert_eq!(utils::combine_ring_element(shares[0], shares[1]), r(42));
}

#[test]
fn multiply_via_pipeline() {
    let dir = tempfile::tempdir().unwrap();

    run_prep(dir.path(), |prep| {
        let (x, y) = prep_two_inputs(prep);
        prep.init_mul().unwrap();
        prep.prepare_mul(x, y);
        prep.exchange().unwrap();
        let _ = prep.finalize_mul();
    });

    let results = run_online(dir.path(), |engine| {
        let (x, y) = online_two_inputs(engine, 9, 7);
        engine.init_mul().unwrap();
        engine.prepare_mul(x, y);
        engine.exchange().unwrap();
        let z = engine.finalize_mul();
        mc::open(engine.network(), z).unwrap()
    });

    assert_eq!(results, vec![r(63), r(63)]);
}

#[test]
fn multiplication_round_is_one_message() {
    let dir = tempfile::tempdir().unwrap();

    run_prep(dir.path(), |prep| {
        let (x, y) = prep_two_inputs(prep);
        prep.init_mul().unwrap();
        for _ in 0..3 {
            prep.prepare_mul(x, y);
        }
        prep.exchange().unwrap();
        for _ in 0..3 {
            let _ = prep.finalize_mul();
        }
    });

    let results = run_online(dir.path(), |engine| {
        let (x, y) = online_two_inputs(engine, 6, 7);
        let before = engine.network().connection_stats().total_sent_frames();
        engine.init_mul().unwrap();
        for _ in 0..3 {
            engine.prepare_mul(x, y);
        }
        engine.exchange().unwrap();
        let after = engine.network().connection_stats().total_sent_frames();
        let products: Vec<_> = (0..3).map(|_| engine.finalize_mul()).collect();
        (after - before, mc::open_many(engine.network(), &products).unwrap())
    });

    for (frames, opened) in results {
        assert_eq!(frames, 1);
        assert_eq!(opened, vec![r(42); 3]);
    }
}

#[test]
fn dot_product() {
    let dir = tempfile::tempdir().unwrap();
    let xs = [1u64, 2, 3, 4];
    let ys = [4u64, 3, 2, 1];

    run_prep(dir.path(), |prep| {
        let mut input = PrepInput::new(prep);
        input.reset_all();
        for _ in 0..4 {
            if prep.my_num() == 1 {
                input.add_mine();
            } else {
                input.add_other(0);
            }
            if prep.my_num() == 2 {
                input.add_mine();
            } else {
                input.add_other(1);
            }
        }
        input.exchange(prep).unwrap();
        let shares: Vec<_> = (0..4).map(|_| (input.finalize(0), input.finalize(1))).collect();

        prep.init_dotprod().unwrap();
        for (x, y) in shares {
            prep.prepare_dotprod(x, y);
        }
        prep.next_dotprod();
        prep.exchange().unwrap();
        let _ = prep.finalize_dotprod(4);
    });

    let results = run_online(dir.path(), move |engine| {
        let mut input = OnlineInput::new(engine);
        input.reset_all();
        for i in 0..4 {
            if engine.my_num() == 1 {
                input.add_mine(r(xs[i]));
            } else {
                input.add_other(0);
            }
            if engine.my_num() == 2 {
                input.add_mine(r(ys[i]));
            } else {
                input.add_other(1);
            }
        }
        input.exchange(engine).unwrap();
        let shares: Vec<_> = (0..4).map(|_| (input.finalize(0), input.finalize(1))).collect();

        engine.init_dotprod().unwrap();
        for (x, y) in shares {
            engine.prepare_dotprod(x, y);
        }
        engine.next_dotprod();
        engine.exchange().unwrap();
        let z = engine.finalize_dotprod(4);
        mc::open(engine.network(), z).unwrap()
    });

    assert_eq!(results, vec![r(20), r(20)]);
}

#[test]
fn unused_results_surface_as_error() {
    let dir = tempfile::tempdir().unwrap();

    run_prep(dir.path(), |prep| {
        let (x, y) = prep_two_inputs(prep);
        prep.init_mul().unwrap();
        prep.prepare_mul(x, y);
        prep.exchange().unwrap();
        let _ = prep.finalize_mul();
    });

    let results = run_online(dir.path(), |engine| {
        let (x, y) = online_two_inputs(engine, 2, 3);
        engine.init_mul().unwrap();
        engine.prepare_mul(x, y);
        engine.exchange().unwrap();
        engine.init_mul().map_err(|e| e.to_string())
    });

    for res in results {
        assert_eq!(res.unwrap_err(), "unused data in Trio");
    }
}

#[test]
fn trunc_big_gap() {
    let dir = tempfile::tempdir().unwrap();
    let tuple = TruncPrTuple::new(1, 0, 48, 10, 64);

    run_prep(dir.path(), move |prep| {
        let mut mem = vec![TrioPrepShare::<u64>::constant(r(1 << 20)); 2];
        prep.trunc_pr(&[tuple], 1, &mut mem).unwrap();
    });

    let results = run_online(dir.path(), move |engine| {
        let mut mem = vec![
            <TrioShare<u64> as OnlineShare<u64>>::constant(r(1 << 20));
            2
        ];
        engine.trunc_pr(&[tuple], 1, &mut mem).unwrap();
        mc::open(engine.network(), mem[1]).unwrap()
    });

    for value in results {
        assert!(
            value == r(1024) || value == r(1025),
            "trunc result {value} out of range"
        );
    }
}

#[test]
fn trunc_small_gap_masked_input() {
    let dir = tempfile::tempdir().unwrap();
    let tuple = TruncPrTuple::new(1, 0, 60, 10, 64);

    run_prep(dir.path(), move |prep| {
        let (x, _) = prep_two_inputs(prep);
        let mut mem = vec![x, TrioPrepShare::default()];
        prep.trunc_pr(&[tuple], 1, &mut mem).unwrap();
    });

    let results = run_online(dir.path(), move |engine| {
        let (x, _) = online_two_inputs(engine, 1 << 20, 0);
        let mut mem = vec![x, TrioShare::default()];
        engine.trunc_pr(&[tuple], 1, &mut mem).unwrap();
        mc::open(engine.network(), mem[1]).unwrap()
    });

    for value in results {
        assert!(
            value == r(1024) || value == r(1025),
            "trunc result {value} out of range"
        );
    }
}

#[test]
fn unsplit_single_destination() {
    let dir = tempfile::tempdir().unwrap();
    let lambda = [1u64, 0];

    run_prep(dir.path(), move |prep| {
        let source = match prep.my_num() {
            0 => TrioPrepShare::from_slots(r(lambda[0]), r(lambda[1])),
            i => TrioPrepShare::from_slots(r(0), r(lambda[i - 1])),
        };
        let mut dest = vec![TrioPrepShare::default(); 1];
        prep.unsplit1(&mut dest, &[source], 1).unwrap();
    });

    let results = run_online(dir.path(), move |engine| {
        // boolean T share: slot difference (xor) is the masked bit
        let masked_bit = 1 ^ lambda[0] ^ lambda[1];
        let my_lambda = lambda[engine.my_num() - 1];
        let source = TrioShare::from_slots(r(masked_bit ^ my_lambda), r(my_lambda));
        let mut dest = vec![TrioShare::default(); 1];
        engine.unsplit1(&mut dest, &[source], 1).unwrap();
        mc::open(engine.network(), dest[0]).unwrap()
    });

    assert_eq!(results, vec![r(1), r(1)]);
}

#[test]
fn random_bits_are_bits() {
    let dir = tempfile::tempdir().unwrap();

    run_prep(dir.path(), |prep| {
        let mut buffers = BufferPrep::new();
        for _ in 0..8 {
            let _ = buffers.get_bit(prep).unwrap();
        }
    });

    let results = run_online(dir.path(), |engine| {
        let mut buffers = BufferPrep::new();
        let bits: Vec<_> = (0..8).map(|_| buffers.get_bit(engine).unwrap()).collect();
        mc::open_many(engine.network(), &bits).unwrap()
    });

    for opened in results {
        for bit in opened {
            assert!(bit == r(0) || bit == r(1), "not a bit: {bit}");
        }
    }
}

#[test]
fn dabits_match_in_both_domains() {
    for rep3_prep in [false, true] {
        let dir = tempfile::tempdir().unwrap();

        {
            let nets = LocalNetwork::new(3);
            let handles: Vec<_> = nets
                .into_iter()
                .map(|net| {
                    let mut options = AstraOptions::with_prep_dir(dir.path());
                    options.rep3_prep = rep3_prep;
                    let seed = [net.id() as u8 + 9; 32];
                    thread::spawn(move || {
                        let mut prep =
                            TrioPrep::<u64, _>::with_seed(net, options, seed).unwrap();
                        let mut buffers = BufferPrep::new();
                        for _ in 0..4 {
                            let _ = buffers.get_dabit(&mut prep).unwrap();
                        }
                    })
                })
                .collect();
            for handle in handles {
                handle.join().unwrap();
            }
        }

        let nets = LocalNetwork::new(2);
        let handles: Vec<_> = nets
            .into_iter()
            .map(|net| {
                let mut options = AstraOptions::with_prep_dir(dir.path());
                options.rep3_prep = rep3_prep;
                thread::spawn(move || {
                    let mut engine = Trio::<u64, _>::new(net, options).unwrap();
                    let mut buffers = BufferPrep::new();
                    let dabits: Vec<_> =
                        (0..4).map(|_| buffers.get_dabit(&mut engine).unwrap()).collect();
                    let arith = mc::open_many(
                        engine.network(),
                        &dabits.iter().map(|d| d.0).collect::<Vec<_>>(),
                    )
                    .unwrap();
                    (arith, dabits.iter().map(|d| d.1).collect::<Vec<_>>())
                })
            })
            .collect();
        let mut outputs = Vec::new();
        for handle in handles {
            outputs.push(handle.join().unwrap());
        }

        let (arith0, bool0) = &outputs[0];
        let (arith1, bool1) = &outputs[1];
        assert_eq!(arith0, arith1);
        for i in 0..4 {
            let arith_bit = arith0[i];
            assert!(arith_bit == r(0) || arith_bit == r(1), "rep3={rep3_prep}");
            let xor_open = bool0[i].common_m_bitwise() ^ bool0[i].b() ^ bool1[i].b();
            assert_eq!(xor_open & r(1), arith_bit, "rep3={rep3_prep}");
        }
    }
}

#[test]
fn pipeline_is_deterministic_in_seeds() {
    let run = || {
        let dir = tempfile::tempdir().unwrap();
        run_prep(dir.path(), |prep| {
            let (x, y) = prep_two_inputs(prep);
            prep.init_mul().unwrap();
            prep.prepare_mul(x, y);
            prep.exchange().unwrap();
            let _ = prep.finalize_mul();
        });
        run_online(dir.path(), |engine| {
            let (x, y) = online_two_inputs(engine, 11, 13);
            engine.init_mul().unwrap();
            engine.prepare_mul(x, y);
            engine.exchange().unwrap();
            let z = engine.finalize_mul();
            (z, mc::open(engine.network(), z).unwrap())
        })
    };

    let first = run();
    let second = run();
    for (a, b) in first.iter().zip(&second) {
        assert_eq!(a, b);
        assert_eq!(a.1, r(143));
    }
}
