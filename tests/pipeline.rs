mod integration {
    mod pipeline {

        extern crate serde_json;
        extern crate siphon;

        use self::serde_json::Value;
        use self::siphon::app::Application;
        use self::siphon::protocols::l2met::Parser;
        use self::siphon::sink::Console;
        use self::siphon::source::{ParseOpts, Pipeline};
        use self::siphon::store::Store;
        use std::io::{self, Write};
        use std::sync::{Arc, Mutex};
        use std::time::Duration;

        #[derive(Clone, Default)]
        struct Shared(Arc<Mutex<Vec<u8>>>);

        impl Write for Shared {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                self.0.lock().unwrap().write(buf)
            }

            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        impl Shared {
            fn records(&self) -> Vec<Value> {
                let out = self.0.lock().unwrap();
                String::from_utf8_lossy(&out)
                    .lines()
                    .map(|l| serde_json::from_str(l).unwrap())
                    .collect()
            }
        }

        fn find<'a>(records: &'a [Value], kind: &str, name: &str) -> &'a Value {
            records
                .iter()
                .find(|r| r["kind"] == kind && r["name"] == name)
                .unwrap_or_else(|| panic!("no {} {} in {:?}", kind, name, records))
        }

        const INPUT: &str = "\
t=\"2013-03-27T20:02:24+0000\" count#requests=1 host=web.1
t=\"2013-03-27T20:02:26+0000\" count#requests@0.1=2 host=web.1
t=\"2013-03-27T20:02:27+0000\" measure#db.query@0.25=12ms host=web.1
t=\"2013-03-27T20:02:28+0000\" sample#conns=4 sample#conns=7
lvl=info msg=\"just a log line\"
count#broken=abc
t=\"2013-03-27T20:02:29+0000\" count#requests=3 host=web.2";

        #[test]
        fn test_end_to_end() {
            let res = Duration::from_secs(10);
            let store = Arc::new(Store::new(res));
            let out = Shared::default();
            let app = Application::new(Arc::clone(&store), Console::new(out.clone()));
            let pipeline = Pipeline::new(Parser::new(res), Arc::clone(&store));

            let passed = Mutex::new(Vec::new());
            pipeline
                .run(INPUT.as_bytes(), ParseOpts::default(), |line| {
                    passed.lock().unwrap().extend_from_slice(line)
                })
                .unwrap();

            assert_eq!(
                "lvl=info msg=\"just a log line\"\ncount#broken=abc\n",
                String::from_utf8(passed.into_inner().unwrap()).unwrap()
            );
            let stats = pipeline.stats();
            assert_eq!(7, stats.lines);
            assert_eq!(2, stats.invalid);
            assert_eq!(0, stats.drops);
            // every fragment is years old
            assert_eq!(6, stats.late);

            // 2013 windows are long closed, so a scan ships them all
            assert_eq!(4, app.scan().unwrap());
            assert!(store.is_empty());

            let records = out.records();
            assert_eq!(4, records.len());

            let window = 1_364_414_540_000_000_000i64;
            for r in &records {
                assert_eq!(window, r["time"].as_i64().unwrap());
            }

            let web1 = records
                .iter()
                .find(|r| r["name"] == "requests" && r["tags"][0][1] == "web.1")
                .unwrap();
            assert_eq!(21.0, web1["sum"]);
            assert_eq!(2, web1["vals"].as_array().unwrap().len());

            let web2 = records
                .iter()
                .find(|r| r["name"] == "requests" && r["tags"][0][1] == "web.2")
                .unwrap();
            assert_eq!(3.0, web2["sum"]);

            let query = find(&records, "measure", "db.query");
            assert_eq!("ms", query["units"]);
            assert_eq!(4, query["vals"].as_array().unwrap().len());
            assert_eq!(48.0, query["sum"]);

            let conns = find(&records, "sample", "conns");
            assert_eq!(11.0, conns["sum"]);
            assert!(conns["tags"].as_array().unwrap().is_empty());
        }

        #[test]
        fn test_flush_ships_open_windows() {
            let res = Duration::from_secs(10);
            let store = Arc::new(Store::new(res));
            let out = Shared::default();
            let app = Application::new(Arc::clone(&store), Console::new(out.clone()));
            let pipeline = Pipeline::new(Parser::new(res), Arc::clone(&store));

            pipeline
                .run(&b"count#now=1 count#now=1\n"[..], ParseOpts::default(), |_| {})
                .unwrap();

            // lines without a time land in the current window
            assert_eq!(0, pipeline.stats().late);
            assert_eq!(1, app.flush().unwrap());
            let records = out.records();
            assert_eq!(1, records.len());
            assert_eq!(2.0, records[0]["sum"]);
        }
    }
}
